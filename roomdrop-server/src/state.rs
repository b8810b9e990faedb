use std::sync::Arc;
use std::time::Instant;

use roomdrop_common::backend::StorageAdapter;

/// Shared application state
pub struct AppState {
    /// The storage adapter selected at startup
    pub storage: Arc<dyn StorageAdapter>,
    /// Provider name reported by the health endpoint
    pub backend_name: &'static str,
    /// Server startup time for uptime calculation
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageAdapter>, backend_name: &'static str) -> Self {
        Self {
            storage,
            backend_name,
            started_at: Instant::now(),
        }
    }
}
