use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/mutations", post(post_mutation))
}

/// POST /api/mutations - Apply one patch, at most once per Idempotency-Key.
///
/// The body is taken raw so a missing key is rejected before any parsing
/// and a replayed key never looks at the body at all.
async fn post_mutation(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.reconciler.apply_raw(key, &body).await {
        Ok(reply) => {
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                reply.body.into_string(),
            )
                .into_response();
            if reply.replayed {
                response
                    .headers_mut()
                    .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
            }
            response
        }
        Err(e) => e.into_response(),
    }
}
