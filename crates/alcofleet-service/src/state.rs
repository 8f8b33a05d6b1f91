//! Application state shared across handlers.

use std::sync::Arc;

use alcofleet_store::Store;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::ingest::IngestEngine;

/// Shared application state.
pub struct AppState {
    /// The data store (wrapped in Mutex for thread-safe access).
    pub store: Mutex<Store>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Telemetry ingestion engine with its per-device lock registry.
    pub engine: IngestEngine,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            engine: IngestEngine::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        let config = state.config.read().await;
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        drop(config);

        assert_eq!(state.engine.locks().len().await, 0);
    }
}
