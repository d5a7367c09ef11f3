//! HTTP handlers for the unlock payment.

use crate::{
    errors::AppError,
    handlers::parse_json,
    models::payment::{PaymentOrder, VerifyPaymentRequest, VerifyPaymentResponse},
    services::payment_service::PaymentService,
};
use axum::{Json, body::Bytes, extract::State};

/// POST `/api/create-order`: `{id, amount, currency}` on success; any
/// failure body carries `error` and no `id`.
pub async fn create_order(
    State(service): State<PaymentService>,
) -> Result<Json<PaymentOrder>, AppError> {
    Ok(Json(service.create_order().await?))
}

/// POST `/api/verify-payment`: `{isOk}`; a rejected signature is `false`,
/// not an error status.
///
/// The body is parsed without requiring a JSON content type: checkout
/// callbacks commonly post it as plain text.
pub async fn verify_payment(
    State(service): State<PaymentService>,
    body: Bytes,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let payload: VerifyPaymentRequest = parse_json(&body)?;
    let is_ok = service.verify_payment(payload).await?;
    Ok(Json(VerifyPaymentResponse { is_ok }))
}
