//! Shared request context.
//!
//! One explicit context object, built once at startup and injected into
//! every handler via axum `State` — no module-level singletons.

use std::sync::Arc;

use lumen_store::Store;
use lumen_sync::SyncService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppContext {
    /// Database handle.
    pub store: Store,
    /// Sync job control surface.
    pub sync: Arc<SyncService>,
}

impl AppContext {
    /// Assemble the context.
    #[must_use]
    pub fn new(store: Store, sync: Arc<SyncService>) -> Self {
        Self { store, sync }
    }
}
