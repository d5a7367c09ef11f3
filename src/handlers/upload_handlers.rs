//! HTTP handlers for signed uploads and the public photo bucket.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `StorageService`.

use crate::{
    errors::AppError,
    handlers::parse_json,
    models::{
        object::StoredObject,
        upload::{SignUploadRequest, UploadCredential},
    },
    services::storage_service::StorageService,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

/// Query string carried by a signed upload URL.
#[derive(Debug, Deserialize)]
pub struct SignedUploadQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub etag: String,
    pub size: i64,
}

/// POST `/api/sign-upload`: issue a single-use write credential.
pub async fn sign_upload(
    State(service): State<StorageService>,
    body: Bytes,
) -> Result<Json<UploadCredential>, AppError> {
    let payload: SignUploadRequest = parse_json(&body)?;
    let path = payload.path.unwrap_or_default();
    let credential = service.create_signed_upload(&path).await?;
    Ok(Json(credential))
}

/// PUT `/storage/v1/object/upload/sign/photos/{key}?token=...`: consume a
/// credential and store the request body.
pub async fn upload_object(
    State(service): State<StorageService>,
    Path(key): Path<String>,
    Query(query): Query<SignedUploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::new(StatusCode::FORBIDDEN, "Missing upload token"))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let object = service
        .upload_object_stream(&key, &token, content_type, stream)
        .await?;

    let mut resp_headers = HeaderMap::new();
    if let Ok(header_value) = HeaderValue::from_str(&format!("\"{}\"", object.etag)) {
        resp_headers.insert(header::ETAG, header_value);
    }

    Ok((
        StatusCode::OK,
        resp_headers,
        Json(UploadResponse {
            key: object.key,
            etag: object.etag,
            size: object.size_bytes,
        }),
    ))
}

/// GET `/storage/v1/object/public/photos/{key}` as a streaming response.
pub async fn get_object(
    State(service): State<StorageService>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let (meta, file) = service.get_object_reader(&key).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&meta.created_at.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}
