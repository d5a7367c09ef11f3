//! Represents a persisted valentine page and the payloads that create it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// Whether a page has been unlocked by a verified payment.
///
/// Stored as lowercase text; `Unpaid -> Paid` is the only transition.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

/// A published valentine page.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Server-generated identifier, immutable.
    pub id: Uuid,

    /// Who the page is for.
    pub recipient_name: String,

    pub message: String,

    /// Public photo URLs in the order they were uploaded.
    pub photos: Json<Vec<String>>,

    /// Optional background track.
    pub music_url: Option<String>,

    pub payment_status: PaymentStatus,

    pub created_at: DateTime<Utc>,

    /// Set when the page flips to `paid`.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/create-valentine`.
///
/// Every field is optional at the wire level so that a missing field is
/// reported as a validation error rather than a deserialization failure.
/// The `partner_name` / `music_url` aliases keep older clients working.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    #[serde(default, alias = "partner_name", skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,

    #[serde(default, alias = "music_url", skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
}

/// Response of `POST /api/create-valentine`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreatePageResponse {
    pub id: Uuid,
    pub success: bool,
}

/// Row shape returned by the diagnostic listing.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: Uuid,
    pub photos: Json<Vec<String>>,
    pub recipient_name: String,
}
