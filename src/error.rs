use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errors from the mutation path. Conflicts are not errors; they are a
/// normal `status: "conflict"` response.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Missing Idempotency-Key")]
    MissingIdempotencyKey,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MutationError {
    /// Returns true if the caller should retry with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutationError::Storage(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MutationError::Validation(_) | MutationError::MissingIdempotencyKey => {
                StatusCode::BAD_REQUEST
            }
            MutationError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for MutationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if self.is_retryable() {
            serde_json::json!({ "detail": self.to_string(), "retryable": true })
        } else {
            serde_json::json!({ "detail": self.to_string() })
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} too long: {len} characters (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Patch key must not be empty")]
    EmptyPatchKey,

    #[error("Patch key is reserved: {0}")]
    ReservedPatchKey(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("Stale write: note {id} is no longer at version {expected}")]
    StaleWrite { id: String, expected: i64 },

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ClockError {
    #[error("Excessive clock drift detected: last timestamp is ahead by {0}us")]
    ExcessiveDrift(i64),
}
