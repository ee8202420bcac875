//! Bookledger
//!
//! Lending ledger and availability engine for a shared pool of physical book
//! copies: borrow, return and overdue sweep under concurrent requests, plus
//! rule-based scoring over the loan history.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: repository::SharedStore,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, store: repository::SharedStore, clock: services::clock::SharedClock) -> Self {
        let services = services::Services::new(store.clone(), clock, &config);
        Self {
            config: Arc::new(config),
            store,
            services: Arc::new(services),
        }
    }
}
