//! HTTP client for the valentine API.
//!
//! `ApiClient` implements every backend trait the client components depend
//! on, so the CLI wires one value into the uploader, the gate and the payment
//! flow.

use crate::{
    client::{
        gate::PageStatusSource,
        payment::PaymentBackend,
        publish::PageBackend,
        uploader::{PhotoFile, UploadBackend},
    },
    models::{
        page::{CreatePageResponse, NewPage, Page, PaymentStatus},
        payment::{PaymentOrder, VerifyPaymentRequest, VerifyPaymentResponse},
        upload::{SignUploadRequest, UploadCredential},
    },
    services::storage_service::PHOTO_BUCKET,
};
use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Unexpected(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Order creation signals failure by the absence of `id`.
#[derive(Deserialize)]
struct CreateOrderBody {
    id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_page(&self, id: Uuid) -> Result<Page, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/api/valentines/{}", id)))
            .send()
            .await?;
        decode(response).await
    }
}

/// Turn a response into `T`, or into `ApiError::Server` carrying the
/// server's `{error}` message.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ApiError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl UploadBackend for ApiClient {
    async fn sign_upload(&self, path: &str) -> Result<UploadCredential, ApiError> {
        let response = self
            .http
            .post(self.url("/api/sign-upload"))
            .json(&SignUploadRequest {
                path: Some(path.to_string()),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn upload(
        &self,
        credential: &UploadCredential,
        file: &PhotoFile,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .put(&credential.signed_url)
            .header(header::CONTENT_TYPE, &file.content_type)
            .body(file.bytes.clone())
            .send()
            .await?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }

    fn public_url(&self, path: &str) -> String {
        self.url(&format!("/storage/v1/object/public/{}/{}", PHOTO_BUCKET, path))
    }
}

#[async_trait]
impl PageBackend for ApiClient {
    async fn create_page(&self, page: &NewPage) -> Result<Uuid, ApiError> {
        let response = self
            .http
            .post(self.url("/api/create-valentine"))
            .json(page)
            .send()
            .await?;
        let created: CreatePageResponse = decode(response).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl PageStatusSource for ApiClient {
    async fn payment_status(&self, page_id: Uuid) -> Result<PaymentStatus, ApiError> {
        Ok(self.fetch_page(page_id).await?.payment_status)
    }
}

#[async_trait]
impl PaymentBackend for ApiClient {
    async fn create_order(&self) -> Result<PaymentOrder, ApiError> {
        let response = self.http.post(self.url("/api/create-order")).send().await?;
        let status = response.status();
        let body: CreateOrderBody = response.json().await?;
        match (body.id, body.amount, body.currency) {
            (Some(id), Some(amount), Some(currency)) => Ok(PaymentOrder {
                id,
                amount,
                currency,
                receipt: String::new(),
                created_at: chrono::Utc::now(),
            }),
            _ => Err(ApiError::Server {
                status: status.as_u16(),
                message: body
                    .error
                    .unwrap_or_else(|| "payment order could not be created".into()),
            }),
        }
    }

    async fn verify_payment(&self, request: &VerifyPaymentRequest) -> Result<bool, ApiError> {
        let response = self
            .http
            .post(self.url("/api/verify-payment"))
            .json(request)
            .send()
            .await?;
        let verdict: VerifyPaymentResponse = decode(response).await?;
        Ok(verdict.is_ok)
    }
}
