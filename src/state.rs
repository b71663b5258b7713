use std::sync::Arc;

use gymintel_backend::config::AppConfig;
use gymintel_backend::db::GymStore;
use gymintel_backend::discovery::SearchDriver;
use gymintel_backend::geocoding::Geocoder;
use gymintel_backend::progress::SearchProgressManager;

/// Shared application state / 应用共享状态
pub struct AppState {
    pub config: AppConfig,
    pub progress: SearchProgressManager,
    pub driver: SearchDriver,
    pub store: Arc<dyn GymStore>,
    pub geocoder: Arc<dyn Geocoder>,
}
