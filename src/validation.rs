use crate::error::ValidationError;
use crate::models::MutationRequest;

pub const MAX_ENTITY_ID_LEN: usize = 64;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;
pub const MAX_TITLE_LEN: usize = 255;

/// Keys that a note snapshot already uses for bookkeeping.
const RESERVED_PATCH_KEYS: [&str; 3] = ["id", "version", "updated_at"];

/// Validator for mutation requests.
pub struct Validator;

impl Validator {
    /// Parse and validate a raw mutation body.
    pub fn parse_mutation(body: &[u8]) -> Result<MutationRequest, ValidationError> {
        let request: MutationRequest = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
        Self::validate_mutation(&request)?;
        Ok(request)
    }

    pub fn validate_mutation(request: &MutationRequest) -> Result<(), ValidationError> {
        if request.entity_type.trim().is_empty() {
            return Err(ValidationError::MissingField("entity_type"));
        }
        if request.entity_id.trim().is_empty() {
            return Err(ValidationError::MissingField("entity_id"));
        }
        Self::check_len("entity_id", &request.entity_id, MAX_ENTITY_ID_LEN)?;

        for (key, value) in &request.patch {
            if key.is_empty() {
                return Err(ValidationError::EmptyPatchKey);
            }
            if RESERVED_PATCH_KEYS.contains(&key.as_str()) {
                return Err(ValidationError::ReservedPatchKey(key.clone()));
            }
            if key == "title" {
                Self::check_len("title", value, MAX_TITLE_LEN)?;
            }
        }

        Ok(())
    }

    pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
        Self::check_len("Idempotency-Key", key, MAX_IDEMPOTENCY_KEY_LEN)
    }

    fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::TooLong { field, len, max });
        }
        Ok(())
    }
}
