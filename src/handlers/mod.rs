use crate::errors::AppError;
use serde::de::DeserializeOwned;

pub mod health_handlers;
pub mod page_handlers;
pub mod payment_handlers;
pub mod upload_handlers;

/// Decode a JSON request body regardless of its declared content type.
/// Malformed bodies become a 400 in the usual error shape.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid request body: {}", err)))
}
