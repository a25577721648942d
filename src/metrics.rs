use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of throttle decisions.
#[derive(Debug, Default)]
pub struct ThrottleMetrics {
    admitted: AtomicU64,
    rejected: AtomicU64,
    unthrottled: AtomicU64,
    swept: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub admitted_requests: u64,
    pub rejected_requests: u64,
    pub unthrottled_requests: u64,
    pub swept_counters: u64,
}

impl ThrottleMetrics {
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unthrottled(&self) {
        self.unthrottled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, removed: usize) {
        self.swept.fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn unthrottled(&self) -> u64 {
        self.unthrottled.load(Ordering::Relaxed)
    }

    pub fn swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let admitted_requests = self.admitted();
        let rejected_requests = self.rejected();
        let unthrottled_requests = self.unthrottled();

        MetricsSnapshot {
            total_requests: admitted_requests + rejected_requests + unthrottled_requests,
            admitted_requests,
            rejected_requests,
            unthrottled_requests,
            swept_counters: self.swept(),
        }
    }
}
