//! Application state shared across all handlers.

use std::sync::Arc;

use crate::resource::ResourceService;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Resource engine: registry plus the five operations.
    engine: Arc<ResourceService>,
}

impl AppState {
    pub fn new(engine: Arc<ResourceService>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { engine }),
        }
    }

    pub fn engine(&self) -> &Arc<ResourceService> {
        &self.inner.engine
    }
}
