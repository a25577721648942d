//! Counter store and admission decisions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::ThrottleOptions;
use crate::counter::{ActionId, CounterEntry, CounterKey, CounterSnapshot, Decision, KeyRef};
use crate::metrics::ThrottleMetrics;
use crate::rate_limit_config::QuotaPolicy;
use crate::sweeper::ExpirySweeper;

/// In-memory fixed window throttle keyed by `(caller, action)`.
///
/// Counters live in a sharded [`DashMap`]; each entry carries its own lock,
/// so lookups for distinct keys only share a shard read lock. Counters are
/// created on first sight of a key and removed only by the sweeper, once
/// they are both expired and idle.
pub struct RateLimiter {
    entries: DashMap<CounterKey, CounterEntry>,
    sweeper: ExpirySweeper,
    max_cache_size: usize,
    clock: Arc<dyn Clock>,
    metrics: ThrottleMetrics,
}

impl RateLimiter {
    pub fn new(options: &ThrottleOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    pub fn with_clock(options: &ThrottleOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            sweeper: ExpirySweeper::new(options.check_period, clock.now()),
            max_cache_size: options.max_cache_size,
            clock,
            metrics: ThrottleMetrics::default(),
        }
    }

    /// Admit or reject one request from `caller` to `action`.
    ///
    /// `policy` is only read when the key has no counter yet; an existing
    /// counter keeps the policy it was created with. `None` means the action
    /// is unthrottled.
    pub fn decide(
        &self,
        caller: &str,
        action: &ActionId,
        policy: Option<&Arc<QuotaPolicy>>,
    ) -> Decision {
        let Some(policy) = policy else {
            self.metrics.record_unthrottled();
            return Decision::Admit;
        };

        let now = self.clock.now();
        if let Some(removed) = self.sweeper.check_if_necessary(now, &self.entries) {
            self.metrics.record_swept(removed);
        }

        let decision = self.decide_at(caller, action, policy, now);
        match &decision {
            Decision::Admit => self.metrics.record_admitted(),
            Decision::Reject(policy) => {
                self.metrics.record_rejected();
                debug!(
                    caller = %caller,
                    action = %action,
                    limit = policy.max_count(),
                    "Rate limit exceeded"
                );
            }
        }
        decision
    }

    fn decide_at(
        &self,
        caller: &str,
        action: &ActionId,
        policy: &Arc<QuotaPolicy>,
        now: Instant,
    ) -> Decision {
        let probe = (caller, action.as_str());
        if let Some(entry) = self.entries.get(&probe as &dyn KeyRef) {
            return entry.admit(now);
        }

        // New key. Make room first: the sweep must not run while we hold a
        // shard lock through `entry()`.
        if let Some(removed) = self
            .sweeper
            .check_capacity(now, self.max_cache_size, &self.entries)
        {
            self.metrics.record_swept(removed);
        }

        match self.entries.entry(CounterKey::new(caller, action.clone())) {
            Entry::Occupied(occupied) => occupied.get().admit(now),
            Entry::Vacant(vacant) => {
                debug!(
                    caller = %caller,
                    action = %action,
                    limit = policy.max_count(),
                    window = ?policy.window(),
                    "Creating new rate limit counter"
                );
                vacant.insert(CounterEntry::opened(Arc::clone(policy), now));
                Decision::Admit
            }
        }
    }

    /// Remove idle counters whose window has elapsed at `now`.
    ///
    /// Returns how many were removed, or `None` if another sweep was running.
    pub fn sweep(&self, now: Instant) -> Option<usize> {
        let removed = self.sweeper.sweep(now, &self.entries)?;
        self.metrics.record_swept(removed);
        Some(removed)
    }

    pub fn snapshot(&self, caller: &str, action: &ActionId) -> Option<CounterSnapshot> {
        let probe = (caller, action.as_str());
        self.entries
            .get(&probe as &dyn KeyRef)
            .map(|entry| entry.snapshot())
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    pub fn metrics(&self) -> &ThrottleMetrics {
        &self.metrics
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}
