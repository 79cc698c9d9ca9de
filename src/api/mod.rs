//! HTTP and WebSocket surface.

pub mod error;
pub mod routes;
pub mod upload;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::ResultCache;
use crate::jobs::{ConnectionManager, JobManager, ProgressTracker};
use crate::monitoring::PrometheusSink;
use crate::orchestration::AsyncOrchestrator;

/// Application state shared across all handlers. Collaborators are
/// constructed once at process start and injected; there is no
/// process-wide mutable state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobManager>,
    pub orchestrator: Arc<AsyncOrchestrator>,
    pub progress: Arc<ProgressTracker>,
    pub broadcaster: Arc<ConnectionManager>,
    pub cache: Arc<ResultCache>,
    /// Present when the Prometheus recorder is installed; `/metrics`
    /// renders from it.
    pub prometheus: Option<Arc<PrometheusSink>>,
    /// Where uploaded annotation blobs are persisted.
    pub scratch_dir: PathBuf,
}
