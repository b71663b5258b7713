use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use gymintel_backend::analytics::{GymAnalytics, ANALYTICS_RADIUS_MILES};
use gymintel_backend::models::{Gym, GymCandidate, ImportResult};

use crate::api::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListGymsQuery {
    pub city: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub location: String,
}

/// 批量导入请求
#[derive(Debug, Deserialize)]
pub struct ImportGymsRequest {
    pub location: String,
    pub gyms: Vec<GymCandidate>,
}

/// GET /api/gyms?city=...&limit=... - 按城市列出健身房
pub async fn list_gyms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListGymsQuery>,
) -> ApiResult<Vec<Gym>> {
    let city = query.city.trim();
    if city.is_empty() {
        return Err(ApiError::BadRequest("city is required".to_string()));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let gyms = state.store.list_by_city(city, limit).await?;
    Ok(Json(ApiResponse::success(gyms)))
}

pub async fn get_gym(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Gym> {
    match state.store.get_gym(&id).await? {
        Some(gym) => Ok(Json(ApiResponse::success(gym))),
        None => Err(ApiError::NotFound(format!("Gym {} not found", id))),
    }
}

/// GET /api/gyms/analytics?location=... - market analytics for gyms around a location
///
/// A location that cannot be geocoded yields empty analytics rather than an error.
pub async fn gym_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<GymAnalytics> {
    let location = query.location.trim();
    if location.is_empty() {
        return Err(ApiError::BadRequest("location is required".to_string()));
    }

    let gyms = match state.geocoder.search_location(location).await? {
        Some(info) => {
            state
                .store
                .list_near(info.latitude, info.longitude, ANALYTICS_RADIUS_MILES)
                .await?
        }
        None => {
            tracing::debug!("Analytics location not found: {}", location);
            Vec::new()
        }
    };

    Ok(Json(ApiResponse::success(GymAnalytics::from_gyms(location, &gyms))))
}

/// POST /api/gyms/import - import gyms collected offline (e.g. by the CLI)
pub async fn import_gyms(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportGymsRequest>,
) -> ApiResult<ImportResult> {
    let location = req.location.trim();
    if location.is_empty() {
        return Err(ApiError::BadRequest("location is required".to_string()));
    }

    tracing::info!("Importing {} gyms for {}", req.gyms.len(), location);
    let result = state.store.upsert_gyms(location, &req.gyms).await?;
    if !result.errors.is_empty() {
        tracing::warn!("Import for {} finished with {} errors", location, result.errors.len());
    }

    Ok(Json(ApiResponse::success(result)))
}
