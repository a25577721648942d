use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::SystemTime;

use crate::throttler::Throttler;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_counters: usize,
}

static START_TIME: LazyLock<SystemTime> = LazyLock::new(SystemTime::now);

impl HealthStatus {
    /// The in-memory throttle has no dependencies that can fail, so the
    /// service is healthy whenever it can answer.
    pub fn capture(throttler: &Throttler) -> Self {
        let now = SystemTime::now();

        Self {
            status: "healthy".to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: now.duration_since(*START_TIME).unwrap_or_default().as_secs(),
            active_counters: throttler.rate_limiter().len(),
        }
    }
}

/// Pin the uptime origin to service start rather than the first health check.
pub fn mark_started() {
    LazyLock::force(&START_TIME);
}
