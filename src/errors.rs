use crate::services::{
    page_service::PageError, payment_service::PaymentError, storage_service::StorageError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal error: {:#}", err);
        AppError::internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingPath | StorageError::InvalidObjectKey(_) => {
                AppError::bad_request(err.to_string())
            }
            StorageError::InvalidToken(_)
            | StorageError::TokenExpired(_)
            | StorageError::TokenUsed(_) => AppError::new(StatusCode::FORBIDDEN, err.to_string()),
            StorageError::ObjectNotFound(_) => AppError::not_found(err.to_string()),
            StorageError::ObjectExists(_) => AppError::new(StatusCode::CONFLICT, err.to_string()),
            StorageError::Sqlx(_) | StorageError::Io(_) => {
                tracing::error!("storage backend error: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<PageError> for AppError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::MissingRecipientName
            | PageError::MissingMessage
            | PageError::MissingPhotos
            | PageError::NotEnoughPhotos { .. } => AppError::bad_request(err.to_string()),
            PageError::NotFound(_) => AppError::not_found(err.to_string()),
            PageError::Sqlx(_) => {
                tracing::error!("page persistence error: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::MissingField(_) | PaymentError::InvalidPageId(_) => {
                AppError::bad_request(err.to_string())
            }
            PaymentError::InvalidKey
            | PaymentError::Gateway(_)
            | PaymentError::Http(_)
            | PaymentError::Sqlx(_) => {
                tracing::error!("payment backend error: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn validation_errors_map_to_client_errors() {
        assert_eq!(
            AppError::from(StorageError::MissingPath).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(PageError::NotEnoughPhotos {
                required: 6,
                actual: 2
            })
            .status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(PaymentError::MissingField("orderId")).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn credential_and_lookup_errors_have_distinct_statuses() {
        assert_eq!(
            AppError::from(StorageError::TokenUsed("k".into())).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(StorageError::ObjectExists("k".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(PageError::NotFound(Uuid::nil())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(PaymentError::Gateway("down".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
