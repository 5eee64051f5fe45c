//! Read-only listing over the entity store. Not part of reconciliation; it
//! sees whatever the last committed mutation left behind.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::models::{ListNotesQuery, ListNotesResponse};
use crate::state::AppState;
use crate::store::entity_store::MAX_PAGE_SIZE;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes", get(list_notes))
        .route("/api/notes/{id}", get(get_note))
}

/// GET /api/notes?q=...&page=...&limit=... - Search notes, newest first.
async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListNotesQuery>,
) -> Response {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

    match state
        .stores
        .entities
        .list(query.q.as_deref(), page, limit)
        .await
    {
        Ok((notes, total)) => Json(ListNotesResponse {
            page,
            limit,
            total,
            notes: notes.iter().map(|n| n.snapshot()).collect(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Failed to list notes: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

/// GET /api/notes/{id} - Current snapshot of one note.
async fn get_note(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.stores.entities.get(&id).await {
        Ok(Some(note)) => Json(note.snapshot()).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Note not found".to_string()),
        Err(e) => {
            tracing::error!("Failed to get note: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(serde_json::json!({ "detail": detail }))).into_response()
}
