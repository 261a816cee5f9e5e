//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::store::{EventStore, HttpEventStore};

/// Application state shared across all requests and sessions.
///
/// Sessions never share mutable state with each other; the only shared
/// resource is the backing store, which handles its own concurrency.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn EventStore>,
}

impl AppState {
    /// Create application state from configuration.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(HttpEventStore::new(
            &config.store_url,
            config.store_deploy_key.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// Create application state with an injected store (used by tests).
    pub fn with_store(config: ServerConfig, store: Arc<dyn EventStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}
