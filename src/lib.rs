//! Valentine page publishing: a server that issues signed photo uploads,
//! persists pages and verifies unlock payments, plus the client pieces that
//! drive it (upload coordinator, preview gate, payment flow).

pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
