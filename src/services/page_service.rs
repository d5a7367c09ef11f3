//! PageService: validates and persists valentine pages.

use crate::models::page::{NewPage, Page, PageSummary, PaymentStatus};
use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Minimum number of photos a page must be created with.
pub const MIN_PHOTOS: usize = 6;

/// How many pages the diagnostic listing returns.
pub const RECENT_PAGES_LIMIT: i64 = 5;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Missing required fields: recipientName")]
    MissingRecipientName,
    #[error("Missing required fields: message")]
    MissingMessage,
    #[error("Missing required fields: photos")]
    MissingPhotos,
    #[error("At least {required} photos are required, got {actual}")]
    NotEnoughPhotos { required: usize, actual: usize },
    #[error("page `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type PageResult<T> = Result<T, PageError>;

/// A creation payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPage {
    pub recipient_name: String,
    pub message: String,
    pub photos: Vec<String>,
    pub music_url: Option<String>,
}

/// Check a creation payload in order, stopping at the first failure:
/// recipient name, message, then photo count.
pub fn validate(page: NewPage) -> PageResult<ValidatedPage> {
    let recipient_name = page
        .recipient_name
        .filter(|name| !name.trim().is_empty())
        .ok_or(PageError::MissingRecipientName)?;
    let message = page
        .message
        .filter(|message| !message.trim().is_empty())
        .ok_or(PageError::MissingMessage)?;
    let photos = page.photos.ok_or(PageError::MissingPhotos)?;
    if photos.len() < MIN_PHOTOS {
        return Err(PageError::NotEnoughPhotos {
            required: MIN_PHOTOS,
            actual: photos.len(),
        });
    }
    let music_url = page.music_url.filter(|url| !url.trim().is_empty());

    Ok(ValidatedPage {
        recipient_name,
        message,
        photos,
        music_url,
    })
}

#[derive(Clone)]
pub struct PageService {
    pub db: Arc<SqlitePool>,
}

impl PageService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Validate and insert a page, returning its id.
    ///
    /// The whole record is written by one INSERT, so a page either exists with
    /// all of its photos or not at all.
    pub async fn create_page(&self, payload: NewPage) -> PageResult<Uuid> {
        let page = validate(payload)?;
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO pages (id, recipient_name, message, photos, music_url, payment_status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&page.recipient_name)
        .bind(&page.message)
        .bind(Json(&page.photos))
        .bind(&page.music_url)
        .bind(PaymentStatus::Unpaid)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        info!(page_id = %id, photos = page.photos.len(), "created page");
        Ok(id)
    }

    pub async fn get_page(&self, id: Uuid) -> PageResult<Page> {
        sqlx::query_as::<_, Page>(
            "SELECT id, recipient_name, message, photos, music_url, payment_status, created_at, paid_at
             FROM pages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(PageError::NotFound(id))
    }

    /// The most recently created pages, newest first.
    pub async fn list_recent(&self) -> PageResult<Vec<PageSummary>> {
        // rowid follows insertion order and pages are never deleted.
        let rows = sqlx::query_as::<_, PageSummary>(
            "SELECT id, photos, recipient_name FROM pages ORDER BY rowid DESC LIMIT ?",
        )
        .bind(RECENT_PAGES_LIMIT)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}
