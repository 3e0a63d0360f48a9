//! Context query settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Latency budget and result limits for context queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Ceiling for the network portion of one query.
    pub fetch_timeout_ms: u64,
    /// Ceiling for detection, query, and formatting together.
    pub total_budget_ms: u64,
    /// Maximum related tasks rendered in the injected block.
    pub related_tasks_limit: usize,
    /// Maximum hits requested from the remote search.
    pub search_limit: usize,
}

impl QuerySettings {
    /// Fetch timeout as a [`Duration`].
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// End-to-end budget as a [`Duration`].
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 400,
            total_budget_ms: 500,
            related_tasks_limit: 3,
            search_limit: 5,
        }
    }
}
