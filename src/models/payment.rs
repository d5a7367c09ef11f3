//! Payment orders and verification payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An order issued by this service for the unlock price.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct PaymentOrder {
    /// Gateway order id (e.g. `order_...`).
    pub id: String,

    /// Amount in the currency's minor unit.
    pub amount: i64,

    pub currency: String,

    #[serde(skip_serializing)]
    #[serde(default)]
    pub receipt: String,

    #[serde(skip)]
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/verify-payment`.
///
/// Aliases accept the checkout widget's native field names.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default, alias = "orderCreationId")]
    pub order_id: Option<String>,

    #[serde(default, alias = "razorpayPaymentId")]
    pub payment_id: Option<String>,

    #[serde(default, alias = "razorpaySignature")]
    pub signature: Option<String>,

    #[serde(default, alias = "valentineId")]
    pub page_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub is_ok: bool,
}
