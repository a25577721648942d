use serde::Serialize;

use crate::metrics::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub caller: String,
    pub action: String,
    /// Requests admitted per window for this action, `None` if unthrottled.
    pub limit: Option<u32>,
}

impl CheckResponse {
    pub fn allowed(caller: String, action: String, limit: Option<u32>) -> Self {
        Self {
            allowed: true,
            caller,
            action,
            limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub counters: usize,
    pub max_cache_size: usize,
    pub rules: usize,
    /// Route actions whose policy lookup is cached.
    pub memoized_actions: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
}

impl ReadyResponse {
    pub fn ready() -> Self {
        Self {
            status: "ready".to_string(),
        }
    }
}
