//! Core data models for the valentine page service.
//!
//! These entities map to SQLite tables via `sqlx::FromRow` and serialize
//! as camelCase JSON via `serde`, which is the shape the HTTP API speaks.

pub mod object;
pub mod page;
pub mod payment;
pub mod upload;
