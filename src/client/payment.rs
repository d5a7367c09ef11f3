//! Client half of the payment flow: create an order, hand it to an external
//! checkout, then ask the server to verify the completion.

use crate::{
    client::{
        api::ApiError,
        gate::{GateError, PreviewGate},
        session::SessionStore,
    },
    models::payment::{PaymentOrder, VerifyPaymentRequest},
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn create_order(&self) -> Result<PaymentOrder, ApiError>;
    async fn verify_payment(&self, request: &VerifyPaymentRequest) -> Result<bool, ApiError>;
}

/// What a completed checkout hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCompletion {
    pub payment_id: String,
    pub signature: String,
}

/// `Ok(None)` means the payer dismissed the checkout.
pub type CheckoutResult = Result<Option<PaymentCompletion>, PaymentFlowError>;

/// The external payment collector (hosted widget, terminal prompt, ...).
#[async_trait]
pub trait Checkout: Send + Sync {
    async fn collect(&self, order: &PaymentOrder) -> CheckoutResult;
}

#[derive(Debug, Error)]
pub enum PaymentFlowError {
    #[error("could not create payment order: {0}")]
    OrderCreation(#[source] ApiError),
    #[error("checkout failed: {0}")]
    Checkout(String),
    #[error("could not verify payment: {0}")]
    Verification(#[source] ApiError),
    #[error(transparent)]
    Gate(#[from] GateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Verified; the gate is now unlocked.
    Unlocked,
    /// The server did not accept the completion. The page stays locked.
    Rejected,
    /// The checkout was dismissed before completion.
    Cancelled,
    /// Nothing to do.
    AlreadyPaid,
}

/// Run one payment attempt for the gate's page.
pub async fn unlock<B, C, S>(
    backend: &B,
    checkout: &C,
    gate: &mut PreviewGate<S>,
) -> Result<PaymentOutcome, PaymentFlowError>
where
    B: PaymentBackend + ?Sized,
    C: Checkout + ?Sized,
    S: SessionStore,
{
    let page_id = gate.created_page_id().ok_or(GateError::NoPage)?;
    if gate.is_paid() {
        return Ok(PaymentOutcome::AlreadyPaid);
    }

    let order = backend
        .create_order()
        .await
        .map_err(PaymentFlowError::OrderCreation)?;
    info!(
        order_id = %order.id,
        amount = order.amount,
        currency = %order.currency,
        "payment order created"
    );

    let Some(completion) = checkout.collect(&order).await? else {
        info!(order_id = %order.id, "checkout dismissed");
        return Ok(PaymentOutcome::Cancelled);
    };

    let request = VerifyPaymentRequest {
        order_id: Some(order.id.clone()),
        payment_id: Some(completion.payment_id),
        signature: Some(completion.signature),
        page_id: Some(page_id.to_string()),
    };
    let verified = backend
        .verify_payment(&request)
        .await
        .map_err(PaymentFlowError::Verification)?;

    if verified {
        gate.mark_paid();
        info!(page_id = %page_id, "page unlocked");
        Ok(PaymentOutcome::Unlocked)
    } else {
        warn!(order_id = %order.id, page_id = %page_id, "payment verification rejected");
        Ok(PaymentOutcome::Rejected)
    }
}
