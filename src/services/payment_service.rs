//! PaymentService: order issuance and payment signature verification.
//!
//! Orders come from an [`OrderGateway`]: the Razorpay Orders API when keys are
//! configured, otherwise a local issuer for development. Verification
//! recomputes `HMAC-SHA256(secret, "{order_id}|{payment_id}")` and, on a
//! match, binds the order to exactly one page and marks that page paid.

use crate::{
    db::is_unique_violation,
    models::{
        page::PaymentStatus,
        payment::{PaymentOrder, VerifyPaymentRequest},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Default unlock price, in paise.
pub const DEFAULT_PRICE_MINOR: i64 = 4900;
pub const DEFAULT_CURRENCY: &str = "INR";

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Missing required fields: {0}")]
    MissingField(&'static str),
    #[error("invalid page id `{0}`")]
    InvalidPageId(String),
    #[error("payment signing key is not usable")]
    InvalidKey,
    #[error("order gateway error: {0}")]
    Gateway(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

/// An order as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Creates orders on the payment provider's side.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> PaymentResult<GatewayOrder>;
}

/// Issues order ids locally. Used when no provider keys are configured.
pub struct LocalOrderGateway;

#[async_trait]
impl OrderGateway for LocalOrderGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        _receipt: &str,
    ) -> PaymentResult<GatewayOrder> {
        Ok(GatewayOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
        })
    }
}

/// Razorpay Orders API client.
pub struct RazorpayGateway {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    api_base: String,
}

#[derive(Serialize)]
struct RazorpayOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct RazorpayErrorResponse {
    error: RazorpayError,
}

#[derive(Deserialize)]
struct RazorpayError {
    description: String,
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self::with_api_base(key_id, key_secret, RAZORPAY_API_BASE)
    }

    pub fn with_api_base(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl OrderGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> PaymentResult<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&RazorpayOrderRequest {
                amount,
                currency,
                receipt,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RazorpayErrorResponse>(&text)
                .map(|e| e.error.description)
                .unwrap_or(text);
            return Err(PaymentError::Gateway(format!("{}: {}", status, message)));
        }

        Ok(response.json::<GatewayOrder>().await?)
    }
}

/// The keyed MAC over `"{order_id}|{payment_id}"` that checkout signatures
/// are made with.
fn signing_mac(secret: &str, order_id: &str, payment_id: &str) -> PaymentResult<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidKey)?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}

/// Compute the hex signature a genuine checkout returns for an order/payment
/// pair.
pub fn payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
) -> PaymentResult<String> {
    let mac = signing_mac(secret, order_id, payment_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a submitted hex signature.
pub fn signature_matches(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(submitted) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mac) = signing_mac(secret, order_id, payment_id) else {
        return false;
    };
    mac.verify_slice(&submitted).is_ok()
}

#[derive(Clone)]
pub struct PaymentService {
    pub db: Arc<SqlitePool>,
    gateway: Arc<dyn OrderGateway>,
    key_secret: String,
    price_minor: i64,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<SqlitePool>,
        gateway: Arc<dyn OrderGateway>,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            key_secret: key_secret.into(),
            price_minor: DEFAULT_PRICE_MINOR,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_price(mut self, price_minor: i64, currency: impl Into<String>) -> Self {
        self.price_minor = price_minor;
        self.currency = currency.into();
        self
    }

    /// Create an order for the unlock price and record it as ours.
    pub async fn create_order(&self) -> PaymentResult<PaymentOrder> {
        let receipt = format!("rcpt_{}", &Uuid::new_v4().simple().to_string()[..16]);
        let order = self
            .gateway
            .create_order(self.price_minor, &self.currency, &receipt)
            .await?;

        let order = PaymentOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO payment_orders (id, amount, currency, receipt, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.receipt)
        .bind(order.created_at)
        .execute(&*self.db)
        .await?;

        info!(order_id = %order.id, amount = order.amount, "created payment order");
        Ok(order)
    }

    /// Verify a checkout completion and unlock the page.
    ///
    /// Returns `Ok(false)` for every rejection: unknown order, bad signature,
    /// unknown page, or an order already bound to a different page or payment.
    /// Missing fields are validation errors; storage failures propagate.
    pub async fn verify_payment(&self, req: VerifyPaymentRequest) -> PaymentResult<bool> {
        let order_id = required(req.order_id, "orderId")?;
        let payment_id = required(req.payment_id, "paymentId")?;
        let signature = required(req.signature, "signature")?;
        let page_raw = required(req.page_id, "pageId")?;
        let page_id =
            Uuid::parse_str(&page_raw).map_err(|_| PaymentError::InvalidPageId(page_raw))?;

        let known_order: Option<String> =
            sqlx::query_scalar("SELECT id FROM payment_orders WHERE id = ?")
                .bind(&order_id)
                .fetch_optional(&*self.db)
                .await?;
        if known_order.is_none() {
            warn!(%order_id, "verification for an order this service did not issue");
            return Ok(false);
        }

        if !signature_matches(&self.key_secret, &order_id, &payment_id, &signature) {
            warn!(%order_id, %payment_id, "payment signature mismatch");
            return Ok(false);
        }

        let mut tx = self.db.begin().await?;

        let status: Option<PaymentStatus> =
            sqlx::query_scalar("SELECT payment_status FROM pages WHERE id = ?")
                .bind(page_id)
                .fetch_optional(&mut *tx)
                .await?;
        if status.is_none() {
            warn!(page_id = %page_id, "verification for an unknown page");
            return Ok(false);
        }

        let insert = sqlx::query(
            "INSERT INTO payments (order_id, payment_id, page_id, verified_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&order_id)
        .bind(&payment_id)
        .bind(page_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                let (bound_page, bound_payment): (Uuid, String) = sqlx::query_as(
                    "SELECT page_id, payment_id FROM payments WHERE order_id = ?",
                )
                .bind(&order_id)
                .fetch_one(&mut *tx)
                .await?;
                if bound_page != page_id || bound_payment != payment_id {
                    warn!(
                        %order_id,
                        bound_page = %bound_page,
                        requested_page = %page_id,
                        "order already applied to another page or payment"
                    );
                    return Ok(false);
                }
            }
            Err(err) => return Err(err.into()),
        }

        let updated = sqlx::query(
            "UPDATE pages SET payment_status = ?, paid_at = ? WHERE id = ? AND payment_status = ?",
        )
        .bind(PaymentStatus::Paid)
        .bind(Utc::now())
        .bind(page_id)
        .bind(PaymentStatus::Unpaid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if updated.rows_affected() == 1 {
            info!(page_id = %page_id, %order_id, %payment_id, "page unlocked");
        } else {
            info!(page_id = %page_id, %order_id, "page already unlocked");
        }
        Ok(true)
    }
}

fn required(value: Option<String>, field: &'static str) -> PaymentResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(PaymentError::MissingField(field))
}
