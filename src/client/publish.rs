//! Publish a page: check the form, upload its photos, create the record and
//! remember the new page in the session.

use crate::{
    client::{
        api::ApiError,
        gate::{GateError, PreviewGate},
        session::SessionStore,
        uploader::{PhotoFile, UploadBackend, UploadCoordinator, UploadError},
    },
    models::page::NewPage,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait PageBackend: Send + Sync {
    async fn create_page(&self, page: &NewPage) -> Result<Uuid, ApiError>;
}

#[derive(Debug, Clone, Default)]
pub struct ValentineForm {
    pub recipient_name: String,
    pub message: String,
    pub photos: Vec<PhotoFile>,
    pub music_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("recipient name is required")]
    MissingRecipientName,
    #[error("message is required")]
    MissingMessage,
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// Photos were uploaded but the page record was not created; they are
    /// left in storage.
    #[error("could not create page: {source}")]
    Create {
        #[source]
        source: ApiError,
        photos: Vec<String>,
    },
    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Run the whole pipeline. Nothing is uploaded if the form is incomplete.
pub async fn publish<U, P, S>(
    form: ValentineForm,
    coordinator: &UploadCoordinator<U>,
    pages: &P,
    gate: &mut PreviewGate<S>,
) -> Result<Uuid, PublishError>
where
    U: UploadBackend,
    P: PageBackend + ?Sized,
    S: SessionStore,
{
    if form.recipient_name.trim().is_empty() {
        return Err(PublishError::MissingRecipientName);
    }
    if form.message.trim().is_empty() {
        return Err(PublishError::MissingMessage);
    }

    let photos = coordinator.upload_all(&form.photos).await?;

    let page = NewPage {
        recipient_name: Some(form.recipient_name),
        message: Some(form.message),
        photos: Some(photos),
        music_url: form.music_url,
    };
    let id = match pages.create_page(&page).await {
        Ok(id) => id,
        Err(source) => {
            return Err(PublishError::Create {
                source,
                photos: page.photos.unwrap_or_default(),
            });
        }
    };

    gate.record_created(id).await?;
    info!(page_id = %id, "page published");
    Ok(id)
}
