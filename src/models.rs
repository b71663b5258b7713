//! Gym domain models / 健身房数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extra confidence granted for each additional source agreeing on a gym
const CONFIDENCE_PER_EXTRA_SOURCE: f64 = 0.1;

/// Resolved location of a search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_place_id: Option<String>,
}

/// Gym as reported by an external source or an import, before it is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymCandidate {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<i64>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl GymCandidate {
    /// Fold another report of the same gym into this one
    pub fn absorb(&mut self, other: GymCandidate) {
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
                self.confidence = (self.confidence + CONFIDENCE_PER_EXTRA_SOURCE).min(1.0);
            }
        }
        self.confidence = self.confidence.max(other.confidence.min(1.0));

        self.rating = match (self.rating, other.rating) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.review_count = match (self.review_count, other.review_count) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };

        if self.address.trim().is_empty() {
            self.address = other.address;
        }
        if self.phone.is_none() {
            self.phone = other.phone;
        }
        if self.website.is_none() {
            self.website = other.website;
        }
    }
}

/// Stored gym / 已入库的健身房
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gym {
    pub id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub source_city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of importing a batch of gyms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub gyms_imported: u64,
    pub gyms_updated: u64,
    pub errors: Vec<String>,
    pub import_duration_seconds: f64,
}
