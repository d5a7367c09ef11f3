//! src/services/storage_service.rs
//!
//! StorageService: signed-upload issuance and the photo bucket. Credentials
//! and object metadata live in SQLite; payloads live on local disk sharded
//! beneath `base_path/photos/{shard}/{shard}/{key}`.

use crate::{
    db::is_unique_violation,
    models::{object::StoredObject, upload::UploadCredential},
};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    time::{Instant, timeout_at},
};
use tracing::{debug, info};
use uuid::Uuid;

/// The single public bucket all photos are written to.
pub const PHOTO_BUCKET: &str = "photos";

/// How long a signed upload credential stays valid.
pub const DEFAULT_UPLOAD_TTL_SECS: i64 = 60;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Missing path")]
    MissingPath,
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("upload token is not valid for `{0}`")]
    InvalidToken(String),
    #[error("upload token for `{0}` has expired")]
    TokenExpired(String),
    #[error("upload token for `{0}` was already used")]
    TokenUsed(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("resource already exists: `{0}`")]
    ObjectExists(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the photo bucket operations:
/// - Issue a signed upload credential for a path
/// - Consume a credential and stream the payload to disk
/// - Serve a stored payload for its public URL
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for credentials and metadata.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable origin used to build signed and public URLs.
    public_url: String,

    upload_ttl: TimeDelta,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    path: String,
    expires_at_ms: i64,
    consumed_at_ms: Option<i64>,
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool, using
    /// `base_path` as the root directory for payloads and `public_url` as the
    /// origin for the URLs it hands out.
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            upload_ttl: TimeDelta::seconds(DEFAULT_UPLOAD_TTL_SECS),
        }
    }

    /// Override the credential validity window.
    pub fn with_upload_ttl(mut self, ttl: TimeDelta) -> Self {
        self.upload_ttl = ttl;
        self
    }

    /// Key validation for the flat photo namespace.
    ///
    /// Keys are a single path segment made of ASCII letters, digits, `.`, `_`
    /// and `-`. They may not start with `.` (temp files use that prefix) and
    /// may not contain `..`.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::MissingPath);
        }
        if key.len() > MAX_OBJECT_KEY_LEN || key.starts_with('.') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        if !key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(PHOTO_BUCKET)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", PHOTO_BUCKET, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Combines base_path/photos/{shard}/{shard}/{key}.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Public URL a stored object is readable at.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.public_url, PHOTO_BUCKET, key
        )
    }

    fn signed_url(&self, key: &str, token: &str) -> String {
        format!(
            "{}/storage/v1/object/upload/sign/{}/{}?token={}",
            self.public_url, PHOTO_BUCKET, key, token
        )
    }

    /// Published objects are immutable; a key can be written once.
    async fn ensure_key_free(&self, key: &str) -> StorageResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM objects WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.db)
            .await?;
        match exists {
            Some(_) => Err(StorageError::ObjectExists(key.to_string())),
            None => Ok(()),
        }
    }

    /// Issue a single-use write credential for `path`.
    ///
    /// Nothing is written to the bucket until the credential is consumed.
    pub async fn create_signed_upload(&self, path: &str) -> StorageResult<UploadCredential> {
        self.ensure_key_safe(path)?;
        self.ensure_key_free(path).await?;

        let token = Uuid::new_v4().simple().to_string();
        let issued_at = Utc::now();
        let expires_at = issued_at + self.upload_ttl;

        sqlx::query(
            "INSERT INTO upload_credentials (token, path, issued_at_ms, expires_at_ms)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(path)
        .bind(issued_at.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .execute(&*self.db)
        .await?;

        info!(path, expires_at = %expires_at, "issued signed upload credential");

        Ok(UploadCredential {
            signed_url: self.signed_url(path, &token),
            token,
            path: path.to_string(),
            expires_at,
        })
    }

    /// Mark the credential for `key` as used and return its expiry in ms.
    ///
    /// A single conditional UPDATE decides validity, so two concurrent writes
    /// with the same token cannot both succeed.
    async fn consume_credential(&self, key: &str, token: &str) -> StorageResult<i64> {
        let now_ms = Utc::now().timestamp_millis();
        let consumed: Option<i64> = sqlx::query_scalar(
            "UPDATE upload_credentials SET consumed_at_ms = ?
             WHERE token = ? AND path = ? AND consumed_at_ms IS NULL AND expires_at_ms > ?
             RETURNING expires_at_ms",
        )
        .bind(now_ms)
        .bind(token)
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&*self.db)
        .await?;

        if let Some(expires_at_ms) = consumed {
            return Ok(expires_at_ms);
        }

        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT path, expires_at_ms, consumed_at_ms FROM upload_credentials WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) if row.path != key => Err(StorageError::InvalidToken(key.to_string())),
            Some(row) if row.consumed_at_ms.is_some() => {
                Err(StorageError::TokenUsed(key.to_string()))
            }
            Some(row) if row.expires_at_ms <= now_ms => {
                Err(StorageError::TokenExpired(key.to_string()))
            }
            _ => Err(StorageError::InvalidToken(key.to_string())),
        }
    }

    /// Fetch object metadata by key.
    async fn fetch_object(&self, key: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, content_type, size_bytes, etag, created_at
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound(key.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Consume the credential for `key` and stream the payload to disk.
    ///
    /// - Rejects the write before touching disk if the credential is unknown,
    ///   bound to another path, used or expired, or if the key already holds
    ///   an object.
    /// - Writes bytes incrementally to a temporary file, computing MD5 and
    ///   size while streaming. The body must arrive before the credential
    ///   expires.
    /// - Links the file into place without replacing an existing one, then
    ///   inserts the metadata row.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        token: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let expires_at_ms = self.consume_credential(key, token).await?;
        self.ensure_key_free(key).await?;
        let remaining_ms = expires_at_ms - Utc::now().timestamp_millis();
        let deadline = Instant::now() + Duration::from_millis(remaining_ms.max(0) as u64);

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        loop {
            let next = match timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    debug!(key, "upload outlived its credential");
                    return Err(StorageError::TokenExpired(key.to_string()));
                }
            };
            let Some(chunk_res) = next else {
                break;
            };
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if Utc::now().timestamp_millis() >= expires_at_ms {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::TokenExpired(key.to_string()));
        }

        // hard_link fails instead of replacing an existing payload.
        let linked = fs::hard_link(&tmp_path, &file_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if let Err(err) = linked {
            return Err(if err.kind() == ErrorKind::AlreadyExists {
                StorageError::ObjectExists(key.to_string())
            } else {
                StorageError::Io(err)
            });
        }

        let created_at: DateTime<Utc> = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (id, key, content_type, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, key, content_type, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(created_at)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                info!(key, size_bytes, etag = %obj.etag, "stored object");
                Ok(obj)
            }
            Err(err) if is_unique_violation(&err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::ObjectExists(key.to_string()))
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but physical file is missing.
    pub async fn get_object_reader(&self, key: &str) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                debug!("metadata for {} exists but payload is missing", key);
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }
}
