pub mod gyms;
pub mod searches;
pub mod server;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: StatusCode, message: &str) -> Self {
        Self {
            code: code.as_u16() as i32,
            message: message.to_string(),
            data: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(ApiResponse::<()>::error(status, &self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(server::health_check))
        .route("/api/searches", post(searches::trigger_search))
        .route("/api/searches/:id", get(searches::get_search))
        .route("/api/searches/:id/ws", get(searches::progress_ws))
        .route("/api/gyms", get(gyms::list_gyms))
        .route("/api/gyms/import", post(gyms::import_gyms))
        .route("/api/gyms/analytics", get(gyms::gym_analytics))
        .route("/api/gyms/:id", get(gyms::get_gym))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use gymintel_backend::config::AppConfig;
    use gymintel_backend::db::{run_migrations, SqliteGymStore};
    use gymintel_backend::discovery::SearchDriver;
    use gymintel_backend::geocoding::Geocoder;
    use gymintel_backend::models::LocationInfo;
    use gymintel_backend::progress::SearchProgressManager;
    use sqlx::sqlite::SqlitePoolOptions;

    pub struct NoGeocoder;

    #[async_trait::async_trait]
    impl Geocoder for NoGeocoder {
        async fn search_location(&self, _query: &str) -> anyhow::Result<Option<LocationInfo>> {
            Ok(None)
        }
    }

    /// Resolves every query to downtown Austin
    pub struct AustinGeocoder;

    #[async_trait::async_trait]
    impl Geocoder for AustinGeocoder {
        async fn search_location(&self, _query: &str) -> anyhow::Result<Option<LocationInfo>> {
            Ok(Some(LocationInfo {
                latitude: 30.2672,
                longitude: -97.7431,
                display_name: "Austin, Texas, United States".to_string(),
                city: Some("Austin".to_string()),
                state: Some("Texas".to_string()),
                postal_code: None,
                google_place_id: None,
            }))
        }
    }

    pub async fn test_state() -> Arc<AppState> {
        test_state_with(Arc::new(NoGeocoder)).await
    }

    pub async fn test_state_with(geocoder: Arc<dyn Geocoder>) -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let store = Arc::new(SqliteGymStore::new(pool));
        let progress = SearchProgressManager::new();
        let driver = SearchDriver::new(progress.clone(), geocoder.clone(), store.clone(), Vec::new());

        Arc::new(AppState {
            config: AppConfig::default(),
            progress,
            driver,
            store,
            geocoder,
        })
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
