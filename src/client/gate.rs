//! Preview/payment gate.
//!
//! Caps previews of an unpaid page at [`PREVIEW_LIMIT`] and lifts the cap
//! once the server reports the page as paid. The counter is persisted
//! through a [`SessionStore`]; the paid flag is only ever taken from the
//! server or from a verified payment.

use crate::{
    client::{
        api::ApiError,
        session::{SessionError, SessionState, SessionStore},
    },
    models::page::PaymentStatus,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const PREVIEW_LIMIT: u32 = 3;

/// Source of truth for a page's payment status.
#[async_trait]
pub trait PageStatusSource: Send + Sync {
    async fn payment_status(&self, page_id: Uuid) -> Result<PaymentStatus, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NoPage,
    LockedUnpaidAvailable { remaining: u32 },
    LockedUnpaidExhausted,
    UnlockedPaid,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no page has been created in this session")]
    NoPage,
    #[error("preview limit of {limit} reached; pay to unlock the page")]
    PreviewLimitReached { limit: u32 },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct PreviewGate<S> {
    store: S,
    session: SessionState,
    is_paid: bool,
    site_url: String,
}

impl<S: SessionStore> PreviewGate<S> {
    /// Load persisted state. The paid flag starts false until [`refresh`].
    ///
    /// [`refresh`]: PreviewGate::refresh
    pub async fn open(store: S, site_url: impl Into<String>) -> Result<Self, GateError> {
        let session = store.load().await?;
        Ok(Self {
            store,
            session,
            is_paid: false,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Re-read the paid flag from the server. Never flips a paid gate back.
    pub async fn refresh<P>(&mut self, source: &P) -> Result<(), GateError>
    where
        P: PageStatusSource + ?Sized,
    {
        let Some(id) = self.session.created_page_id else {
            return Ok(());
        };
        let status = source.payment_status(id).await?;
        if status.is_paid() && !self.is_paid {
            info!(page_id = %id, "page is paid");
            self.is_paid = true;
        }
        Ok(())
    }

    pub fn state(&self) -> GateState {
        match self.session.created_page_id {
            None => GateState::NoPage,
            Some(_) if self.is_paid => GateState::UnlockedPaid,
            Some(_) if self.session.preview_count >= PREVIEW_LIMIT => {
                GateState::LockedUnpaidExhausted
            }
            Some(_) => GateState::LockedUnpaidAvailable {
                remaining: PREVIEW_LIMIT - self.session.preview_count,
            },
        }
    }

    pub fn created_page_id(&self) -> Option<Uuid> {
        self.session.created_page_id
    }

    pub fn preview_count(&self) -> u32 {
        self.session.preview_count
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    /// Remember a freshly created page. The preview counter is left alone.
    pub async fn record_created(&mut self, page_id: Uuid) -> Result<(), GateError> {
        let mut next = self.session.clone();
        next.created_page_id = Some(page_id);
        self.store.save(&next).await?;
        self.session = next;
        self.is_paid = false;
        Ok(())
    }

    /// Consume one preview and return the view URL.
    ///
    /// Paid pages preview without touching the counter. The incremented
    /// counter is saved before the URL is handed out.
    pub async fn preview(&mut self) -> Result<String, GateError> {
        let id = match self.state() {
            GateState::NoPage => return Err(GateError::NoPage),
            GateState::LockedUnpaidExhausted => {
                return Err(GateError::PreviewLimitReached {
                    limit: PREVIEW_LIMIT,
                });
            }
            GateState::UnlockedPaid | GateState::LockedUnpaidAvailable { .. } => {
                self.session.created_page_id.ok_or(GateError::NoPage)?
            }
        };

        if !self.is_paid {
            let mut next = self.session.clone();
            next.preview_count += 1;
            self.store.save(&next).await?;
            self.session = next;
            debug!(page_id = %id, count = self.session.preview_count, "preview");
        }
        Ok(self.view_url(id))
    }

    /// Only call after the server verified a payment.
    pub fn mark_paid(&mut self) {
        self.is_paid = true;
    }

    /// Forget the page and the counter. The server record is untouched.
    pub async fn reset(&mut self) -> Result<(), GateError> {
        self.store.clear().await?;
        self.session = SessionState::default();
        self.is_paid = false;
        Ok(())
    }

    /// The permanent link, available once paid.
    pub fn share_url(&self) -> Option<String> {
        match (self.is_paid, self.session.created_page_id) {
            (true, Some(id)) => Some(self.view_url(id)),
            _ => None,
        }
    }

    fn view_url(&self, id: Uuid) -> String {
        format!("{}/love/{}", self.site_url, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::MemorySessionStore;
    use std::sync::Arc;

    struct FixedStatus(PaymentStatus);

    #[async_trait]
    impl PageStatusSource for FixedStatus {
        async fn payment_status(&self, _: Uuid) -> Result<PaymentStatus, ApiError> {
            Ok(self.0)
        }
    }

    type SharedGate = PreviewGate<Arc<MemorySessionStore>>;

    async fn gate_with_page() -> (SharedGate, Arc<MemorySessionStore>, Uuid) {
        let store = Arc::new(MemorySessionStore::default());
        let mut gate = PreviewGate::open(store.clone(), "https://love.example/")
            .await
            .unwrap();
        let id = Uuid::new_v4();
        gate.record_created(id).await.unwrap();
        (gate, store, id)
    }

    #[tokio::test]
    async fn empty_session_has_no_page() {
        let mut gate = PreviewGate::open(MemorySessionStore::default(), "http://x")
            .await
            .unwrap();
        assert_eq!(gate.state(), GateState::NoPage);
        assert!(matches!(gate.preview().await, Err(GateError::NoPage)));
        gate.refresh(&FixedStatus(PaymentStatus::Paid)).await.unwrap();
        assert!(!gate.is_paid());
    }

    #[tokio::test]
    async fn three_previews_then_exhausted() {
        let (mut gate, store, id) = gate_with_page().await;
        assert_eq!(
            gate.state(),
            GateState::LockedUnpaidAvailable { remaining: 3 }
        );

        for n in 1..=3 {
            let url = gate.preview().await.unwrap();
            assert_eq!(url, format!("https://love.example/love/{id}"));
            assert_eq!(store.snapshot().preview_count, n);
        }
        assert_eq!(gate.state(), GateState::LockedUnpaidExhausted);
        assert!(matches!(
            gate.preview().await,
            Err(GateError::PreviewLimitReached { limit: 3 })
        ));
        assert_eq!(gate.preview_count(), 3);
        assert_eq!(gate.share_url(), None);
    }

    #[tokio::test]
    async fn counter_survives_reopen() {
        let (mut gate, store, id) = gate_with_page().await;
        gate.preview().await.unwrap();
        gate.preview().await.unwrap();

        let reopened = PreviewGate::open(store, "https://love.example").await.unwrap();
        assert_eq!(reopened.created_page_id(), Some(id));
        assert_eq!(
            reopened.state(),
            GateState::LockedUnpaidAvailable { remaining: 1 }
        );
    }

    #[tokio::test]
    async fn paid_page_previews_without_limit() {
        let (mut gate, store, _) = gate_with_page().await;
        for _ in 0..3 {
            gate.preview().await.unwrap();
        }
        gate.refresh(&FixedStatus(PaymentStatus::Paid)).await.unwrap();
        assert_eq!(gate.state(), GateState::UnlockedPaid);
        for _ in 0..5 {
            gate.preview().await.unwrap();
        }
        assert_eq!(store.snapshot().preview_count, 3);
        assert!(gate.share_url().is_some());
    }

    #[tokio::test]
    async fn refresh_never_relocks() {
        let (mut gate, _, _) = gate_with_page().await;
        gate.mark_paid();
        gate.refresh(&FixedStatus(PaymentStatus::Unpaid)).await.unwrap();
        assert!(gate.is_paid());
    }

    #[tokio::test]
    async fn reset_clears_from_any_state() {
        let (mut gate, store, _) = gate_with_page().await;
        for _ in 0..3 {
            gate.preview().await.unwrap();
        }
        gate.reset().await.unwrap();
        assert_eq!(gate.state(), GateState::NoPage);
        assert_eq!(store.snapshot(), SessionState::default());

        let (mut gate, store, _) = gate_with_page().await;
        gate.mark_paid();
        gate.reset().await.unwrap();
        assert!(!gate.is_paid());
        assert_eq!(gate.preview_count(), 0);
        assert_eq!(store.snapshot(), SessionState::default());
    }

    #[tokio::test]
    async fn new_page_keeps_counter() {
        let (mut gate, _, _) = gate_with_page().await;
        gate.preview().await.unwrap();
        gate.record_created(Uuid::new_v4()).await.unwrap();
        assert_eq!(gate.preview_count(), 1);
    }
}
