//! Short-lived write credentials for the photo bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single-use, time-limited authorization to write one object.
///
/// Returned by `POST /api/sign-upload`. The `signed_url` already carries the
/// token, so a client can `PUT` the payload to it directly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredential {
    pub signed_url: String,
    pub token: String,
    pub path: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /api/sign-upload`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SignUploadRequest {
    #[serde(default)]
    pub path: Option<String>,
}
