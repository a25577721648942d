//! Per-key counter state.
//!
//! A [`CounterEntry`] tracks one `(caller, action)` pair. Its mutable state
//! sits behind its own mutex so that requests for the same key serialize
//! while requests for other keys never touch that lock.

use crate::rate_limit_config::QuotaPolicy;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

/// Opaque identifier of a throttled action, e.g. `"POST /auth/login"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(Arc<str>);

impl ActionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Action id for an HTTP route: `"<METHOD> <route path>"`.
    pub fn from_route(method: &str, path: &str) -> Self {
        Self(format!("{method} {path}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The route path of an HTTP action id, or the whole id otherwise.
    pub fn path(&self) -> &str {
        self.0
            .split_once(' ')
            .map(|(_, path)| path)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Borrowed view of a counter key, so the store can be probed with a
/// `(&str, &str)` pair without building an owned key.
pub trait KeyRef {
    fn caller(&self) -> &str;
    fn action(&self) -> &str;
}

impl Hash for dyn KeyRef + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.caller().hash(state);
        self.action().hash(state);
    }
}

impl PartialEq for dyn KeyRef + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.caller() == other.caller() && self.action() == other.action()
    }
}

impl Eq for dyn KeyRef + '_ {}

impl KeyRef for (&str, &str) {
    fn caller(&self) -> &str {
        self.0
    }

    fn action(&self) -> &str {
        self.1
    }
}

/// Identifies one independently throttled target.
#[derive(Debug, Clone)]
pub struct CounterKey {
    caller: String,
    action: ActionId,
}

impl CounterKey {
    pub fn new(caller: impl Into<String>, action: ActionId) -> Self {
        Self {
            caller: caller.into(),
            action,
        }
    }
}

impl KeyRef for CounterKey {
    fn caller(&self) -> &str {
        &self.caller
    }

    fn action(&self) -> &str {
        self.action.as_str()
    }
}

// Hash and Eq go through `KeyRef` so owned keys and borrowed probes agree.
impl Hash for CounterKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as &dyn KeyRef).hash(state)
    }
}

impl PartialEq for CounterKey {
    fn eq(&self, other: &Self) -> bool {
        (self as &dyn KeyRef) == (other as &dyn KeyRef)
    }
}

impl Eq for CounterKey {}

impl<'a> Borrow<dyn KeyRef + 'a> for CounterKey {
    fn borrow(&self) -> &(dyn KeyRef + 'a) {
        self
    }
}

/// Verdict for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Rejected under the policy the key's counter was created with.
    Reject(Arc<QuotaPolicy>),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

#[derive(Debug)]
struct CounterState {
    request_count: u64,
    last_access: Instant,
    /// Set once the current window takes a request besides its opener.
    active: bool,
}

impl CounterState {
    fn is_expired(&self, now: Instant, policy: &QuotaPolicy) -> bool {
        now.saturating_duration_since(self.last_access) > policy.window()
    }
}

/// Point-in-time copy of an entry's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub request_count: u64,
    pub last_access: Instant,
    pub idle: bool,
}

#[derive(Debug)]
pub struct CounterEntry {
    policy: Arc<QuotaPolicy>,
    state: Mutex<CounterState>,
}

impl CounterEntry {
    /// An entry whose first window is opened by the request creating it.
    /// That request counts and is admitted.
    pub fn opened(policy: Arc<QuotaPolicy>, now: Instant) -> Self {
        Self {
            policy,
            state: Mutex::new(CounterState {
                request_count: 1,
                last_access: now,
                active: false,
            }),
        }
    }

    pub fn policy(&self) -> &Arc<QuotaPolicy> {
        &self.policy
    }

    /// Record one request at `now` and decide it.
    ///
    /// An elapsed window resets the count and admits; the window's reference
    /// time only moves on such a reset. Inside the window every request is
    /// counted, including the rejected ones, and only the first `max_count`
    /// are admitted.
    pub fn admit(&self, now: Instant) -> Decision {
        let mut state = self.state.lock();

        if state.is_expired(now, &self.policy) {
            state.request_count = 0;
            state.last_access = now;
            state.active = false;
            return Decision::Admit;
        }

        let observed = state.request_count;
        state.request_count = observed.saturating_add(1);
        state.active = true;

        if observed < u64::from(self.policy.max_count()) {
            Decision::Admit
        } else {
            Decision::Reject(Arc::clone(&self.policy))
        }
    }

    /// Whether a sweep at `now` may drop this entry: its window has elapsed
    /// and nothing but the window's opening request ever hit it.
    pub fn is_sweepable(&mut self, now: Instant) -> bool {
        let state = self.state.get_mut();
        !state.active && state.is_expired(now, &self.policy)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let state = self.state.lock();
        CounterSnapshot {
            request_count: state.request_count,
            last_access: state.last_access,
            idle: !state.active,
        }
    }
}
