use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{GymSource, SINGLE_SOURCE_CONFIDENCE};
use crate::models::{GymCandidate, LocationInfo};
use crate::utils::miles_to_meters;

const BUSINESS_SEARCH_URL: &str = "https://api.yelp.com/v3/businesses/search";
const MAX_RADIUS_METERS: u32 = 40_000;
const PAGE_SIZE: &str = "50";

/// Yelp Fusion business search, `categories=gyms`
pub struct YelpSource {
    client: Client,
    api_key: String,
}

impl YelpSource {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl GymSource for YelpSource {
    fn name(&self) -> &str {
        "yelp"
    }

    async fn search(&self, location: &LocationInfo, radius_miles: f64) -> Result<Vec<GymCandidate>> {
        let response = self
            .client
            .get(BUSINESS_SEARCH_URL)
            .bearer_auth(&self.api_key)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("radius", miles_to_meters(radius_miles, MAX_RADIUS_METERS).to_string()),
                ("categories", "gyms".to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Yelp returned HTTP {}", response.status()));
        }

        let body: BusinessSearchResponse = response.json().await?;
        let gyms = body.into_candidates();
        tracing::info!("Yelp returned {} gyms near {}", gyms.len(), location.display_name);
        Ok(gyms)
    }
}

#[derive(Debug, Deserialize)]
struct BusinessSearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
}

#[derive(Debug, Deserialize)]
struct Business {
    name: String,
    #[serde(default)]
    coordinates: Option<Coordinates>,
    #[serde(default)]
    location: Option<BusinessLocation>,
    #[serde(default)]
    display_phone: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    review_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BusinessLocation {
    #[serde(default)]
    display_address: Vec<String>,
}

impl BusinessSearchResponse {
    /// Businesses without coordinates are skipped
    fn into_candidates(self) -> Vec<GymCandidate> {
        self.businesses
            .into_iter()
            .filter_map(|b| {
                let coordinates = b.coordinates?;
                Some(GymCandidate {
                    name: b.name,
                    address: b.location.map(|l| l.display_address.join(", ")).unwrap_or_default(),
                    latitude: coordinates.latitude?,
                    longitude: coordinates.longitude?,
                    phone: b.display_phone.filter(|p| !p.is_empty()),
                    website: b.url,
                    rating: b.rating,
                    review_count: b.review_count,
                    sources: vec!["yelp".to_string()],
                    confidence: SINGLE_SOURCE_CONFIDENCE,
                })
            })
            .collect()
    }
}
