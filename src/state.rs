//! Shared handler state.

use crate::{
    config::AppConfig,
    services::{
        page_service::PageService,
        payment_service::{LocalOrderGateway, OrderGateway, PaymentService, RazorpayGateway},
        storage_service::StorageService,
    },
};
use axum::extract::FromRef;
use chrono::TimeDelta;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Everything the router hands to its handlers. Each service can be
/// extracted on its own via `State<StorageService>` and friends.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub storage: StorageService,
    pub pages: PageService,
    pub payments: PaymentService,
}

impl AppState {
    /// Wire the services from configuration.
    pub fn from_config(cfg: &AppConfig, db: Arc<SqlitePool>) -> Self {
        let storage = StorageService::new(
            db.clone(),
            cfg.storage_dir.clone(),
            cfg.public_url.clone(),
        )
        .with_upload_ttl(TimeDelta::seconds(cfg.upload_ttl_secs));

        let gateway: Arc<dyn OrderGateway> = match &cfg.razorpay_key_id {
            Some(key_id) => {
                tracing::info!("Using Razorpay order gateway");
                Arc::new(RazorpayGateway::new(
                    key_id.clone(),
                    cfg.razorpay_key_secret.clone(),
                ))
            }
            None => {
                tracing::info!("Using local order gateway");
                Arc::new(LocalOrderGateway)
            }
        };
        let payments = PaymentService::new(db.clone(), gateway, cfg.razorpay_key_secret.clone())
            .with_price(cfg.price_minor, cfg.currency.clone());

        Self {
            storage,
            pages: PageService::new(db),
            payments,
        }
    }
}
