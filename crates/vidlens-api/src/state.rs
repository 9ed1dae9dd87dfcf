//! Application state.

use std::sync::Arc;

use vidlens_queue::{JobStore, TaskQueue};

use crate::config::ApiConfig;
use crate::gateway::JobGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub gateway: JobGateway,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        let gateway = JobGateway::new(Arc::clone(&store), Arc::clone(&queue));
        Self {
            config,
            gateway,
            store,
            queue,
        }
    }
}
