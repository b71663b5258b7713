//! External gym data sources / 外部健身房数据源

pub mod google_places;
pub mod yelp;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::SourcesConfig;
use crate::models::{GymCandidate, LocationInfo};

pub use google_places::GooglePlacesSource;
pub use yelp::YelpSource;

/// Confidence of a gym reported by a single source
pub const SINGLE_SOURCE_CONFIDENCE: f64 = 0.6;

#[async_trait]
pub trait GymSource: Send + Sync {
    /// Short identifier recorded on every gym this source reports
    fn name(&self) -> &str;

    /// Status reported while this source is being queried
    fn search_status(&self) -> String {
        format!("searching_{}", self.name())
    }

    async fn search(&self, location: &LocationInfo, radius_miles: f64) -> Result<Vec<GymCandidate>>;
}

/// Build every source that has an API key configured, in query order (Yelp, then Google)
pub fn configured_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn GymSource>>> {
    let mut sources: Vec<Arc<dyn GymSource>> = Vec::new();

    if let Some(key) = &config.yelp_api_key {
        sources.push(Arc::new(YelpSource::new(key, config.request_timeout_secs)?));
    }
    if let Some(key) = &config.google_places_api_key {
        sources.push(Arc::new(GooglePlacesSource::new(key, config.request_timeout_secs)?));
    }

    if sources.is_empty() {
        tracing::warn!("No gym data source API keys configured, searches will report an error");
    } else {
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        tracing::info!("Gym data sources enabled: {}", names.join(", "));
    }
    Ok(sources)
}
