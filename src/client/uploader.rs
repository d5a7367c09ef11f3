//! Upload coordinator: turns local photo files into public URLs.
//!
//! Each file is signed, uploaded and resolved in turn. The batch is not
//! atomic: the first failure aborts it, and files stored before that point
//! stay in the bucket. Their paths are reported in the error so an operator
//! can clean them up.

use crate::{
    client::api::ApiError, models::upload::UploadCredential, services::page_service::MIN_PHOTOS,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::{path::Path, sync::Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Server operations the coordinator needs.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    async fn sign_upload(&self, path: &str) -> Result<UploadCredential, ApiError>;
    async fn upload(
        &self,
        credential: &UploadCredential,
        file: &PhotoFile,
    ) -> Result<(), ApiError>;
    fn public_url(&self, path: &str) -> String;
}

/// A photo read into memory, ready to upload.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(name, content_type, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please upload at least {required} photos (got {actual})")]
    NotEnoughPhotos { required: usize, actual: usize },
    #[error("`{0}` is not an image")]
    NotAnImage(String),
    #[error("upload of `{file}` failed: {source}")]
    Aborted {
        /// Position of the failing file in the input.
        index: usize,
        file: String,
        #[source]
        source: ApiError,
        /// Paths stored before the abort; they are not removed.
        orphaned: Vec<String>,
    },
}

/// Keep `[A-Za-z0-9.-]`, drop everything else.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Destination paths `<millis>_<sanitized name>`, one per file. Timestamps
/// strictly increase across the batch, so equal names never collide.
pub fn plan_paths<'a>(names: impl IntoIterator<Item = &'a str>, now_ms: i64) -> Vec<String> {
    let mut stamp = now_ms - 1;
    names
        .into_iter()
        .map(|name| {
            stamp += 1;
            format!("{}_{}", stamp, sanitize_filename(name))
        })
        .collect()
}

pub struct UploadCoordinator<B> {
    backend: B,
    concurrency: usize,
}

impl<B: UploadBackend> UploadCoordinator<B> {
    /// Sequential coordinator.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            concurrency: 1,
        }
    }

    /// Allow up to `n` uploads in flight. Output order still matches input.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Upload every file and return their public URLs in input order.
    pub async fn upload_all(&self, files: &[PhotoFile]) -> Result<Vec<String>, UploadError> {
        if files.len() < MIN_PHOTOS {
            return Err(UploadError::NotEnoughPhotos {
                required: MIN_PHOTOS,
                actual: files.len(),
            });
        }
        if let Some(file) = files.iter().find(|f| !f.is_image()) {
            return Err(UploadError::NotAnImage(file.name.clone()));
        }

        let paths = plan_paths(
            files.iter().map(|f| f.name.as_str()),
            Utc::now().timestamp_millis(),
        );
        let stored = Mutex::new(Vec::with_capacity(files.len()));

        let outcome = {
            let stored = &stored;
            let mut uploads = stream::iter(files.iter().zip(paths.iter()).enumerate())
                .map(|(index, (file, path))| async move {
                    let url = self.upload_one(file, path).await.map_err(|e| (index, e))?;
                    if let Ok(mut done) = stored.lock() {
                        done.push(path.clone());
                    }
                    Ok::<_, (usize, ApiError)>(url)
                })
                .buffered(self.concurrency);

            let mut urls = Vec::with_capacity(files.len());
            let mut failure = None;
            while let Some(result) = uploads.next().await {
                match result {
                    Ok(url) => urls.push(url),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            match failure {
                None => Ok(urls),
                Some(err) => Err(err),
            }
        };

        match outcome {
            Ok(urls) => {
                info!(count = urls.len(), "uploaded photo batch");
                Ok(urls)
            }
            Err((index, source)) => {
                let orphaned = stored.into_inner().unwrap_or_else(|e| e.into_inner());
                warn!(
                    file = %files[index].name,
                    orphaned = orphaned.len(),
                    "photo upload aborted: {}",
                    source
                );
                Err(UploadError::Aborted {
                    index,
                    file: files[index].name.clone(),
                    source,
                    orphaned,
                })
            }
        }
    }

    async fn upload_one(&self, file: &PhotoFile, path: &str) -> Result<String, ApiError> {
        let credential = self.backend.sign_upload(path).await?;
        if credential.path != path {
            return Err(ApiError::Unexpected(format!(
                "credential issued for `{}` instead of `{}`",
                credential.path, path
            )));
        }
        self.backend.upload(&credential, file).await?;
        debug!(path, "uploaded photo");
        Ok(self.backend.public_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory bucket that can be told to fail a given call.
    #[derive(Default)]
    struct FakeBackend {
        signed: Mutex<Vec<String>>,
        uploaded: Mutex<Vec<String>>,
        fail_sign_at: Option<usize>,
        fail_upload_of: Option<String>,
        sign_calls: AtomicUsize,
        slow_first: bool,
    }

    #[async_trait]
    impl UploadBackend for FakeBackend {
        async fn sign_upload(&self, path: &str) -> Result<UploadCredential, ApiError> {
            let call = self.sign_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_sign_at == Some(call) {
                return Err(ApiError::Server {
                    status: 500,
                    message: "quota exceeded".into(),
                });
            }
            self.signed.lock().unwrap().push(path.to_string());
            Ok(UploadCredential {
                signed_url: format!("http://fake/{path}?token=t"),
                token: "t".into(),
                path: path.to_string(),
                expires_at: Utc::now(),
            })
        }

        async fn upload(
            &self,
            credential: &UploadCredential,
            file: &PhotoFile,
        ) -> Result<(), ApiError> {
            if self.slow_first && file.name == "0.jpg" {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            if self.fail_upload_of.as_deref() == Some(file.name.as_str()) {
                return Err(ApiError::Server {
                    status: 403,
                    message: "upload token has expired".into(),
                });
            }
            self.uploaded.lock().unwrap().push(credential.path.clone());
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("http://public/{path}")
        }
    }

    fn photos(n: usize) -> Vec<PhotoFile> {
        (0..n)
            .map(|i| PhotoFile::new(format!("{i}.jpg"), "image/jpeg", vec![i as u8]))
            .collect()
    }

    #[test]
    fn sanitize_keeps_safe_characters_only() {
        assert_eq!(sanitize_filename("my photo (1).JPG"), "myphoto1.JPG");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("日本.png"), "png");
        assert_eq!(sanitize_filename("💖"), "photo");
        assert_eq!(sanitize_filename("a-b.c"), "a-b.c");
    }

    #[test]
    fn planned_paths_are_unique_and_timestamped() {
        let paths = plan_paths(["a.jpg", "a.jpg", "b c.png"], 1_700_000_000_000);
        assert_eq!(
            paths,
            vec![
                "1700000000000_a.jpg",
                "1700000000001_a.jpg",
                "1700000000002_bc.png"
            ]
        );
    }

    #[tokio::test]
    async fn urls_match_input_order() {
        let coordinator = UploadCoordinator::new(FakeBackend::default());
        let files = photos(6);
        let urls = coordinator.upload_all(&files).await.unwrap();

        assert_eq!(urls.len(), 6);
        for (i, url) in urls.iter().enumerate() {
            assert!(url.starts_with("http://public/"));
            assert!(url.ends_with(&format!("_{i}.jpg")), "{url}");
        }
        let signed = coordinator.backend().signed.lock().unwrap().clone();
        assert_eq!(*coordinator.backend().uploaded.lock().unwrap(), signed);
    }

    #[tokio::test]
    async fn concurrent_uploads_keep_input_order() {
        let backend = FakeBackend {
            slow_first: true,
            ..FakeBackend::default()
        };
        let coordinator = UploadCoordinator::new(backend).with_concurrency(4);
        let urls = coordinator.upload_all(&photos(7)).await.unwrap();
        assert!(urls[0].ends_with("_0.jpg"));
        assert!(urls[6].ends_with("_6.jpg"));
        // The slow first file finished after later ones.
        assert_ne!(
            coordinator.backend().uploaded.lock().unwrap()[0],
            coordinator.backend().signed.lock().unwrap()[0]
        );
    }

    #[tokio::test]
    async fn too_few_photos_uploads_nothing() {
        let coordinator = UploadCoordinator::new(FakeBackend::default());
        let err = coordinator.upload_all(&photos(5)).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::NotEnoughPhotos {
                required: 6,
                actual: 5
            }
        ));
        assert_eq!(coordinator.backend().sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_images_are_refused_up_front() {
        let coordinator = UploadCoordinator::new(FakeBackend::default());
        let mut files = photos(6);
        files.push(PhotoFile::new("notes.txt", "text/plain", "hi"));
        let err = coordinator.upload_all(&files).await.unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage(name) if name == "notes.txt"));
        assert_eq!(coordinator.backend().sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signing_failure_aborts_and_reports_orphans() {
        let backend = FakeBackend {
            fail_sign_at: Some(3),
            ..FakeBackend::default()
        };
        let coordinator = UploadCoordinator::new(backend);
        let err = coordinator.upload_all(&photos(6)).await.unwrap_err();

        match err {
            UploadError::Aborted {
                index,
                file,
                orphaned,
                source,
            } => {
                assert_eq!(index, 3);
                assert_eq!(file, "3.jpg");
                assert_eq!(orphaned.len(), 3);
                assert!(matches!(source, ApiError::Server { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing after the failing file was attempted.
        assert_eq!(coordinator.backend().sign_calls.load(Ordering::SeqCst), 4);
        assert_eq!(coordinator.backend().uploaded.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn upload_failure_aborts_batch() {
        let backend = FakeBackend {
            fail_upload_of: Some("0.jpg".into()),
            ..FakeBackend::default()
        };
        let coordinator = UploadCoordinator::new(backend);
        let err = coordinator.upload_all(&photos(6)).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Aborted { index: 0, ref orphaned, .. } if orphaned.is_empty()
        ));
        assert!(err.to_string().contains("0.jpg"));
    }

    #[tokio::test]
    async fn reads_photo_from_disk_with_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beach day.png");
        tokio::fs::write(&path, b"\x89PNG").await.unwrap();

        let photo = PhotoFile::from_path(&path).await.unwrap();
        assert_eq!(photo.name, "beach day.png");
        assert_eq!(photo.content_type, "image/png");
        assert!(photo.is_image());
        assert_eq!(&photo.bytes[..], b"\x89PNG");
    }
}
