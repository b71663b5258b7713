use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::types::SearchStatus;

/// Estimate used for a freshly created search
const INITIAL_ESTIMATE_SECS: i64 = 30;
/// Rough time needed per remaining percent of progress
const MILLIS_PER_PERCENT: f64 = 300.0;

/// Progress snapshot pushed to subscribers（用于WebSocket推送）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProgress {
    pub search_id: String,
    pub status: SearchStatus,
    pub progress_percentage: f64,
    pub current_step: String,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub message: Option<String>,
    /// Geocoding result serialized as JSON
    pub location_info: Option<String>,
}

impl SearchProgress {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Snapshot sent to a client that asked for a search that does not exist
    pub fn not_found(search_id: &str) -> Self {
        Self {
            search_id: search_id.to_string(),
            status: SearchStatus::Error,
            progress_percentage: 0.0,
            current_step: "Search not found".to_string(),
            estimated_completion: None,
            message: Some(format!("Search ID {} not found", search_id)),
            location_info: None,
        }
    }
}

impl From<&SearchRecord> for SearchProgress {
    fn from(record: &SearchRecord) -> Self {
        Self {
            search_id: record.id.clone(),
            status: record.status.clone(),
            progress_percentage: record.progress,
            current_step: record.current_step.clone(),
            estimated_completion: record.estimated_completion,
            message: record.message.clone(),
            location_info: record.location_info.clone(),
        }
    }
}

/// In-flight or recently finished search
#[derive(Debug, Clone)]
pub struct SearchRecord {
    pub id: String,
    pub location: String,
    pub radius: f64,
    pub status: SearchStatus,
    pub progress: f64,
    pub current_step: String,
    pub message: Option<String>,
    pub location_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl SearchRecord {
    pub fn new(location: &str, radius: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            location: location.to_string(),
            radius,
            status: SearchStatus::Pending,
            progress: 0.0,
            current_step: "Initializing search".to_string(),
            message: None,
            location_info: None,
            created_at: now,
            estimated_completion: Some(now + Duration::seconds(INITIAL_ESTIMATE_SECS)),
        }
    }
}

/// Heuristic completion time for a search at `progress` percent
pub fn estimate_completion(now: DateTime<Utc>, progress: f64) -> DateTime<Utc> {
    let remaining = (100.0 - progress).clamp(0.0, 100.0);
    now + Duration::milliseconds((remaining * MILLIS_PER_PERCENT) as i64)
}
