//! Geocoding: turn a city name or zipcode into coordinates / 地理编码
//!
//! Google Places is tried first when a key is configured; any Google failure
//! falls back to Nominatim. Lookups are US-only.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{GeocodingConfig, SourcesConfig};
use crate::models::LocationInfo;
use crate::utils::{clean_zipcode, is_zipcode};

const GOOGLE_PLACES_BASE: &str = "https://maps.googleapis.com/maps/api/place";

/// Address keys that may carry the city name, in order of preference
const CITY_KEYS: [&str; 5] = ["city", "town", "village", "municipality", "suburb"];

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the location does not exist
    async fn search_location(&self, query: &str) -> Result<Option<LocationInfo>>;
}

pub struct GeocodingService {
    client: Client,
    nominatim_url: String,
    user_agent: String,
    google_api_key: Option<String>,
}

impl GeocodingService {
    pub fn new(geocoding: &GeocodingConfig, sources: &SourcesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(geocoding.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            nominatim_url: geocoding.nominatim_url.trim_end_matches('/').to_string(),
            user_agent: geocoding.user_agent.clone(),
            google_api_key: sources.google_places_api_key.clone(),
        })
    }

    async fn nominatim(&self, query: &str, us_only: bool) -> Result<Option<LocationInfo>> {
        let mut params = vec![
            ("q", query),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("limit", "1"),
        ];
        if us_only {
            params.push(("countrycodes", "us"));
        }

        let response = self
            .client
            .get(format!("{}/search", self.nominatim_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Nominatim returned HTTP {}", response.status()));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        places.into_iter().next().map(LocationInfo::try_from).transpose()
    }

    async fn google(&self, api_key: &str, query: &str) -> Result<Option<LocationInfo>> {
        let find: GoogleFindPlace = self
            .client
            .get(format!("{}/findplacefromtext/json", GOOGLE_PLACES_BASE))
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", "place_id"),
                ("key", api_key),
            ])
            .send()
            .await?
            .json()
            .await?;

        let Some(place_id) = find.into_place_id()? else {
            return Ok(None);
        };

        let details: GooglePlaceDetails = self
            .client
            .get(format!("{}/details/json", GOOGLE_PLACES_BASE))
            .query(&[
                ("place_id", place_id.as_str()),
                ("fields", "place_id,name,formatted_address,geometry,address_components"),
                ("key", api_key),
            ])
            .send()
            .await?
            .json()
            .await?;

        details.into_location_info()
    }
}

#[async_trait]
impl Geocoder for GeocodingService {
    async fn search_location(&self, query: &str) -> Result<Option<LocationInfo>> {
        let query = query.trim();

        if is_zipcode(query) {
            return self.nominatim(&format!("{}, USA", query), false).await;
        }

        if let Some(api_key) = &self.google_api_key {
            match self.google(api_key, query).await {
                Ok(Some(info)) => {
                    tracing::info!("Google Places validated city: {}", info.display_name);
                    return Ok(Some(info));
                }
                Ok(None) => tracing::debug!("Google Places found nothing for {}", query),
                Err(e) => tracing::error!("Google Places API error: {}", e),
            }
        }

        let query = if query.to_lowercase().contains("usa") {
            query.to_string()
        } else {
            format!("{}, USA", query)
        };
        self.nominatim(&query, true).await
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: HashMap<String, Value>,
}

impl TryFrom<NominatimPlace> for LocationInfo {
    type Error = anyhow::Error;

    fn try_from(place: NominatimPlace) -> Result<Self> {
        let field = |key: &str| place.address.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(LocationInfo {
            latitude: place.lat.parse()?,
            longitude: place.lon.parse()?,
            city: CITY_KEYS.iter().find_map(|key| field(*key)),
            state: field("state"),
            postal_code: field("postcode").map(|p| clean_zipcode(&p)),
            google_place_id: None,
            display_name: place.display_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GoogleFindPlace {
    status: String,
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    place_id: String,
}

impl GoogleFindPlace {
    fn into_place_id(self) -> Result<Option<String>> {
        match self.status.as_str() {
            "OK" => Ok(self.candidates.into_iter().next().map(|c| c.place_id)),
            "ZERO_RESULTS" => Ok(None),
            status => Err(anyhow!(
                "Google Places returned {}: {}",
                status,
                self.error_message.unwrap_or_default()
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GooglePlaceDetails {
    status: String,
    result: Option<GooglePlace>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GooglePlace {
    place_id: String,
    name: String,
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: GoogleGeometry,
    #[serde(default)]
    address_components: Vec<GoogleAddressComponent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleGeometry {
    pub(crate) location: GoogleLatLng,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleLatLng {
    pub(crate) lat: f64,
    pub(crate) lng: f64,
}

#[derive(Debug, Deserialize)]
struct GoogleAddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl GooglePlaceDetails {
    fn into_location_info(self) -> Result<Option<LocationInfo>> {
        match self.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" | "NOT_FOUND" => return Ok(None),
            status => {
                return Err(anyhow!(
                    "Google Places returned {}: {}",
                    status,
                    self.error_message.unwrap_or_default()
                ))
            }
        }
        let Some(place) = self.result else {
            return Ok(None);
        };

        let component = |kind: &str| {
            place
                .address_components
                .iter()
                .find(|c| c.types.iter().any(|t| t == kind))
                .map(|c| c.long_name.clone())
        };

        Ok(Some(LocationInfo {
            latitude: place.geometry.location.lat,
            longitude: place.geometry.location.lng,
            city: component("locality").or_else(|| Some(place.name.clone())),
            state: component("administrative_area_level_1"),
            postal_code: component("postal_code"),
            display_name: place.formatted_address.clone().unwrap_or_else(|| place.name.clone()),
            google_place_id: Some(place.place_id.clone()),
        }))
    }
}
