//! Opportunistic cleanup of idle counters.
//!
//! There is no background task: the rate limiter asks the sweeper before each
//! decision, and again before inserting a key into a full store. Only one
//! thread scans at a time; everyone else skips instead of waiting.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::counter::{CounterEntry, CounterKey};

pub struct ExpirySweeper {
    check_period: Duration,
    /// Held for the duration of a scan; guards the next time-triggered scan.
    next_check: Mutex<Instant>,
}

impl ExpirySweeper {
    pub fn new(check_period: Duration, now: Instant) -> Self {
        Self {
            check_period,
            next_check: Mutex::new(now + check_period),
        }
    }

    /// Time trigger: scan only once `check_period` has passed since the last
    /// scan.
    pub fn check_if_necessary(
        &self,
        now: Instant,
        entries: &DashMap<CounterKey, CounterEntry>,
    ) -> Option<usize> {
        let mut next_check = self.next_check.try_lock()?;
        if *next_check >= now {
            return None;
        }
        Some(self.remove_expired(&mut next_check, now, entries))
    }

    /// Size trigger: scan whenever the store has reached `max_size`.
    pub fn check_capacity(
        &self,
        now: Instant,
        max_size: usize,
        entries: &DashMap<CounterKey, CounterEntry>,
    ) -> Option<usize> {
        if entries.len() < max_size {
            return None;
        }
        debug!(size = entries.len(), max_size, "Counter store full, forcing sweep");
        self.sweep(now, entries)
    }

    /// Unconditional scan. `None` when another thread is already sweeping.
    pub fn sweep(
        &self,
        now: Instant,
        entries: &DashMap<CounterKey, CounterEntry>,
    ) -> Option<usize> {
        let Some(mut next_check) = self.next_check.try_lock() else {
            trace!("Sweep already in progress, skipping");
            return None;
        };
        Some(self.remove_expired(&mut next_check, now, entries))
    }

    fn remove_expired(
        &self,
        next_check: &mut Instant,
        now: Instant,
        entries: &DashMap<CounterKey, CounterEntry>,
    ) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let mut removed = 0;
        entries.retain(|_, entry| {
            let sweep = entry.is_sweepable(now);
            removed += usize::from(sweep);
            !sweep
        });
        *next_check = now + self.check_period;

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept idle counters");
        }
        removed
    }
}
