pub mod config;
pub mod engine;
pub mod generate;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use config::DaemonConfig;
use engine::TaskService;
use generate::GenerationClient;
use storage::Storage;

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    /// Task materialization + progress tracking facade.
    pub tasks: TaskService,
    /// Completion-API client for routine generation.  Constructed once from
    /// config at startup and passed through here — never a process-global.
    /// None when no API key is configured; the generate route reports a
    /// dependency error instead of attempting a network call.
    pub generator: Option<Arc<GenerationClient>>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(
        config: Arc<DaemonConfig>,
        storage: Arc<Storage>,
        generator: Option<Arc<GenerationClient>>,
    ) -> Self {
        let tasks = TaskService::new(storage.clone(), config.materializer.horizon_days);
        Self {
            config,
            storage,
            tasks,
            generator,
            started_at: std::time::Instant::now(),
        }
    }
}
