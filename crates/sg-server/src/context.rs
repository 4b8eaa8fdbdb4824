//! Application context shared by all route handlers via axum state.

use std::sync::Arc;

use sg_av::Supervisor;
use sg_core::config::Config;

/// Central state: immutable configuration and the single stream supervisor.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub supervisor: Arc<Supervisor>,
}

impl AppContext {
    /// Build a context whose supervisor uses `config.stream`.
    pub fn new(config: Config) -> Self {
        let supervisor = Arc::new(Supervisor::new(config.stream.clone()));
        Self {
            config: Arc::new(config),
            supervisor,
        }
    }
}
