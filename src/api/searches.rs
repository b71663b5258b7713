use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use gymintel_backend::progress::{SearchProgress, SearchProgressManager};

use crate::api::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// 触发搜索请求
#[derive(Debug, Deserialize)]
pub struct TriggerSearchRequest {
    pub location: String,
    pub radius: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct TriggerSearchResponse {
    pub search_id: String,
}

/// POST /api/searches - start a background gym search, track it via the WebSocket
pub async fn trigger_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerSearchRequest>,
) -> ApiResult<TriggerSearchResponse> {
    let location = req.location.trim();
    if location.is_empty() {
        return Err(ApiError::BadRequest("location is required".to_string()));
    }

    let radius = req.radius.unwrap_or(state.config.search.default_radius);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ApiError::BadRequest("radius must be a positive number".to_string()));
    }

    let search_id = state.driver.trigger(location, radius);
    Ok(Json(ApiResponse::success(TriggerSearchResponse { search_id })))
}

/// GET /api/searches/:id - 当前进度快照
pub async fn get_search(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> ApiResult<SearchProgress> {
    state
        .progress
        .get_search(&search_id)
        .map(|progress| Json(ApiResponse::success(progress)))
        .ok_or_else(|| ApiError::NotFound(format!("Search {} not found", search_id)))
}

/// GET /api/searches/:id/ws - 进度推送（WebSocket）
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> Response {
    let manager = state.progress.clone();
    ws.on_upgrade(move |socket| stream_progress(socket, manager, search_id))
}

/// Push snapshots until a terminal one was sent or the client went away.
/// The subscription is released when it goes out of scope, on every exit path.
async fn stream_progress(mut socket: WebSocket, manager: SearchProgressManager, search_id: String) {
    let mut subscription = match manager.subscribe(&search_id) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!("Progress stream rejected: {}", e);
            let _ = send_progress(&mut socket, &SearchProgress::not_found(&search_id)).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(progress) = update else {
                    break;
                };
                if let Err(e) = send_progress(&mut socket, &progress).await {
                    tracing::debug!("Progress stream for {} closed by client: {}", search_id, e);
                    break;
                }
                if progress.is_terminal() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::debug!("Client left progress stream for {}", search_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn send_progress(socket: &mut WebSocket, progress: &SearchProgress) -> Result<(), axum::Error> {
    let text = serde_json::to_string(progress).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}
