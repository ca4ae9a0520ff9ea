use std::sync::Arc;

use crate::pipeline::Orchestrator;
use crate::store::RecordStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    /// The single pipeline engine for this process.
    pub orchestrator: Orchestrator,
}
