use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::models::SyncQuery;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/sync", get(get_sync))
}

/// GET /api/sync?cursor=... - Changes since the cursor, and the next cursor.
async fn get_sync(State(state): State<AppState>, Query(query): Query<SyncQuery>) -> Response {
    match state.sync.get_changes(query.cursor.as_deref()).await {
        Ok(response) => {
            tracing::debug!(
                changes = response.changes.len(),
                next_cursor = %response.next_cursor,
                "Served sync"
            );
            Json(response).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to read changes: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "detail": e.to_string(), "retryable": true })),
            )
                .into_response()
        }
    }
}
