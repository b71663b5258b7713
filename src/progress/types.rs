use std::fmt;

use serde::{Deserialize, Serialize};

/// Search status / 搜索状态
///
/// Any string is accepted: names outside the known phases are kept verbatim
/// in `Other`. Only `complete` and `error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SearchStatus {
    Pending,
    Geocoding,
    Searching,
    Merging,
    Complete,
    Error,
    Other(String),
}

impl SearchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SearchStatus::Pending => "pending",
            SearchStatus::Geocoding => "geocoding",
            SearchStatus::Searching => "searching",
            SearchStatus::Merging => "merging",
            SearchStatus::Complete => "complete",
            SearchStatus::Error => "error",
            SearchStatus::Other(status) => status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.as_str(), "complete" | "error")
    }
}

impl From<&str> for SearchStatus {
    fn from(status: &str) -> Self {
        match status {
            "pending" => SearchStatus::Pending,
            "geocoding" => SearchStatus::Geocoding,
            "searching" => SearchStatus::Searching,
            "merging" => SearchStatus::Merging,
            "complete" => SearchStatus::Complete,
            "error" => SearchStatus::Error,
            other => SearchStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for SearchStatus {
    fn from(status: String) -> Self {
        SearchStatus::from(status.as_str())
    }
}

impl From<SearchStatus> for String {
    fn from(status: SearchStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle identifying one subscriber channel of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Search {0} not found")]
    NotFound(String),
}
