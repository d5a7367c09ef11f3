//! Local session persistence.
//!
//! The created page id and preview counter survive restarts. Nothing here is
//! trusted for payment status; that is always rehydrated from the server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(
        rename = "valentine_created_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_page_id: Option<Uuid>,
    #[serde(rename = "valentine_preview_count", default)]
    pub preview_count: u32,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<SessionState, SessionError>;
    async fn save(&self, state: &SessionState) -> Result<(), SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load(&self) -> Result<SessionState, SessionError> {
        (**self).load().await
    }

    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        (**self).save(state).await
    }

    async fn clear(&self) -> Result<(), SessionError> {
        (**self).clear().await
    }
}

/// JSON file on disk. A missing file is an empty session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<SessionState, SessionError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionState::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<SessionState>,
}

impl MemorySessionStore {
    pub fn new(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<SessionState, SessionError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        *self.lock() = state.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.lock() = SessionState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().await.unwrap(), SessionState::default());
    }

    #[tokio::test]
    async fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));
        let state = SessionState {
            created_page_id: Some(Uuid::new_v4()),
            preview_count: 2,
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["valentine_preview_count"], 2);
        assert!(json["valentine_created_id"].is_string());

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), SessionState::default());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileSessionStore::new(path);
        assert!(matches!(
            store.load().await,
            Err(SessionError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemorySessionStore::default();
        let state = SessionState {
            created_page_id: None,
            preview_count: 1,
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
        store.clear().await.unwrap();
        assert_eq!(store.snapshot(), SessionState::default());
    }
}
