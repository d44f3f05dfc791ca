//! Shared application state for the Axum API server.

use std::sync::Arc;

use civic_common::config::AppConfig;
use civic_dispatch::service::NotificationService;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    pub fn new(config: AppConfig, notifications: NotificationService) -> Self {
        Self {
            config,
            notifications: Arc::new(notifications),
        }
    }
}
