use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{GymSource, SINGLE_SOURCE_CONFIDENCE};
use crate::geocoding::GoogleGeometry;
use crate::models::{GymCandidate, LocationInfo};
use crate::utils::miles_to_meters;

const NEARBY_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
/// Nearby Search rejects larger radii
const MAX_RADIUS_METERS: u32 = 50_000;

/// Google Places Nearby Search, `type=gym`
pub struct GooglePlacesSource {
    client: Client,
    api_key: String,
}

impl GooglePlacesSource {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl GymSource for GooglePlacesSource {
    fn name(&self) -> &str {
        "google_places"
    }

    fn search_status(&self) -> String {
        "searching_google".to_string()
    }

    async fn search(&self, location: &LocationInfo, radius_miles: f64) -> Result<Vec<GymCandidate>> {
        let response: NearbySearchResponse = self
            .client
            .get(NEARBY_SEARCH_URL)
            .query(&[
                ("location", format!("{},{}", location.latitude, location.longitude)),
                ("radius", miles_to_meters(radius_miles, MAX_RADIUS_METERS).to_string()),
                ("type", "gym".to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let gyms = response.into_candidates()?;
        tracing::info!("Google Places returned {} gyms near {}", gyms.len(), location.display_name);
        Ok(gyms)
    }
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<NearbyPlace>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NearbyPlace {
    name: String,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: GoogleGeometry,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<i64>,
}

impl NearbySearchResponse {
    fn into_candidates(self) -> Result<Vec<GymCandidate>> {
        match self.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Ok(Vec::new()),
            status => {
                return Err(anyhow!(
                    "Google Places returned {}: {}",
                    status,
                    self.error_message.unwrap_or_default()
                ))
            }
        }

        Ok(self
            .results
            .into_iter()
            .map(|place| GymCandidate {
                name: place.name,
                address: place.formatted_address.or(place.vicinity).unwrap_or_default(),
                latitude: place.geometry.location.lat,
                longitude: place.geometry.location.lng,
                phone: None,
                website: None,
                rating: place.rating,
                review_count: place.user_ratings_total,
                sources: vec!["google_places".to_string()],
                confidence: SINGLE_SOURCE_CONFIDENCE,
            })
            .collect())
    }
}
