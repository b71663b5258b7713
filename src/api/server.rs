use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub build_time: &'static str,
    pub active_searches: usize,
    pub data_sources: Vec<&'static str>,
}

/// GET /api/health - 健康检查
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    let mut data_sources = Vec::new();
    if state.config.sources.google_places_api_key.is_some() {
        data_sources.push("google_places");
    }
    if state.config.sources.yelp_api_key.is_some() {
        data_sources.push("yelp");
    }

    Json(ApiResponse::success(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        build_time: env!("BUILD_TIME"),
        active_searches: state.progress.active_searches(),
        data_sources,
    }))
}
