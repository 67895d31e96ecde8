use std::sync::Arc;

use crate::engine::MemoryEngine;
use crate::index::VectorIndex;

/// Shared handler state: the engine behind the routes.
pub struct AppState<I: VectorIndex + 'static> {
    /// The memory engine.
    pub engine: Arc<MemoryEngine<I>>,
}

impl<I: VectorIndex + 'static> AppState<I> {
    /// Wraps an engine for the router.
    pub fn new(engine: Arc<MemoryEngine<I>>) -> Self {
        Self { engine }
    }
}

impl<I: VectorIndex + 'static> Clone for AppState<I> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}
