use dashmap::DashMap;
use orchestrator::RunState;
use std::sync::Arc;

use crate::models::ResearchResponse;

/// Status and final response of the most recent runs, by run id.
///
/// Holds at most `max_entries` runs. When a new run would exceed that, a
/// quarter of the finished runs are forgotten; runs still in flight are
/// never evicted.
#[derive(Clone)]
pub struct RunRegistry {
    statuses: Arc<DashMap<String, RunState>>,
    results: Arc<DashMap<String, ResearchResponse>>,
    max_entries: usize,
}

impl RunRegistry {
    pub fn new(max_entries: usize) -> Self {
        Self {
            statuses: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn set_status(&self, id: &str, state: RunState) {
        if !self.statuses.contains_key(id) && self.statuses.len() >= self.max_entries {
            self.evict_finished();
        }
        self.statuses.insert(id.to_string(), state);
    }

    pub fn status(&self, id: &str) -> Option<RunState> {
        self.statuses.get(id).map(|r| *r.value())
    }

    pub fn store_result(&self, id: &str, response: ResearchResponse) {
        self.results.insert(id.to_string(), response);
    }

    pub fn result(&self, id: &str) -> Option<ResearchResponse> {
        self.results.get(id).map(|r| r.value().clone())
    }

    fn evict_finished(&self) {
        let to_remove: Vec<String> = self
            .statuses
            .iter()
            .filter(|r| r.value().is_terminal())
            .take((self.max_entries / 4).max(1))
            .map(|r| r.key().clone())
            .collect();
        for id in to_remove {
            self.statuses.remove(&id);
            self.results.remove(&id);
        }
    }
}
