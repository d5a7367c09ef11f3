//! HTTP handlers for page creation and lookup.

use crate::{
    errors::AppError,
    handlers::parse_json,
    models::page::{CreatePageResponse, NewPage, Page, PageSummary},
    services::page_service::PageService,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct RecentPagesResponse {
    pub data: Vec<PageSummary>,
}

/// POST `/api/create-valentine`
pub async fn create_valentine(
    State(service): State<PageService>,
    body: Bytes,
) -> Result<Json<CreatePageResponse>, AppError> {
    let payload: NewPage = parse_json(&body)?;
    let id = service.create_page(payload).await?;
    Ok(Json(CreatePageResponse { id, success: true }))
}

/// GET `/api/valentines/{id}`: the page record, including its payment status.
pub async fn get_valentine(
    State(service): State<PageService>,
    Path(id): Path<String>,
) -> Result<Json<Page>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::bad_request(format!("invalid page id `{}`", id)))?;
    Ok(Json(service.get_page(id).await?))
}

/// GET `/api/debug-photos`: the five newest pages. Diagnostic only.
pub async fn debug_photos(
    State(service): State<PageService>,
) -> Result<Json<RecentPagesResponse>, AppError> {
    let data = service.list_recent().await?;
    Ok(Json(RecentPagesResponse { data }))
}
