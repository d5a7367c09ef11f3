//! Represents a photo payload stored in the public bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single uploaded object.
///
/// The payload itself lives on disk; this row is what the public read path
/// consults for content type and length.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object key inside the photo bucket (flat namespace).
    pub key: String,

    /// Content type (MIME type) sent by the uploader.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: String,

    /// When the payload was written.
    pub created_at: DateTime<Utc>,
}
