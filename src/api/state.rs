use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::posting::PostingClient;
use crate::queue::WorkQueue;
use crate::state_store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<StateStore>,
    pub queue: Arc<WorkQueue>,
    pub posting: Arc<PostingClient>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<StateStore>,
        queue: Arc<WorkQueue>,
        posting: Arc<PostingClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            posting,
            metrics,
        }
    }
}
