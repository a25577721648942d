use std::sync::Arc;
use validator::Validate;

use crate::clock::{Clock, SystemClock};
use crate::config::ThrottleOptions;
use crate::counter::{ActionId, Decision};
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::rate_limit_config::QuotaPolicy;
use crate::rate_limiter::RateLimiter;
use crate::resolver::PolicyResolver;

/// Main throttler service: resolves the quota of an action and enforces it
/// per caller.
pub struct Throttler {
    rate_limiter: RateLimiter,
    resolver: PolicyResolver,
    default_error_text: String,
}

impl Throttler {
    pub fn new(options: ThrottleOptions, resolver: PolicyResolver) -> ThrottlerResult<Self> {
        Self::with_clock(options, resolver, Arc::new(SystemClock))
    }

    pub fn with_clock(
        options: ThrottleOptions,
        resolver: PolicyResolver,
        clock: Arc<dyn Clock>,
    ) -> ThrottlerResult<Self> {
        options.validate()?;

        Ok(Self {
            rate_limiter: RateLimiter::with_clock(&options, clock),
            resolver,
            default_error_text: options.default_error_text,
        })
    }

    /// Check whether `caller` may invoke the route action `action` right now.
    ///
    /// Unthrottled actions always pass. On success the applied policy is
    /// returned, `None` for unthrottled actions. A rejection carries the
    /// message the client should see along with the quota it ran into.
    pub fn check(
        &self,
        caller: &str,
        action: &ActionId,
    ) -> ThrottlerResult<Option<Arc<QuotaPolicy>>> {
        let policy = self.resolver.resolve(action);
        self.enforce(caller, action, policy)
    }

    /// Like [`Throttler::check`], for action ids named by a client rather
    /// than taken from a route. Their resolution is not memoized.
    pub fn check_action(
        &self,
        caller: &str,
        action: &ActionId,
    ) -> ThrottlerResult<Option<Arc<QuotaPolicy>>> {
        let policy = self.resolver.resolve_uncached(action);
        self.enforce(caller, action, policy)
    }

    fn enforce(
        &self,
        caller: &str,
        action: &ActionId,
        policy: Option<Arc<QuotaPolicy>>,
    ) -> ThrottlerResult<Option<Arc<QuotaPolicy>>> {
        match self.rate_limiter.decide(caller, action, policy.as_ref()) {
            Decision::Admit => Ok(policy),
            Decision::Reject(policy) => Err(ThrottlerError::TooManyRequests {
                message: self.error_text(&policy).to_string(),
                limit: policy.max_count(),
                window: policy.window(),
            }),
        }
    }

    /// The message for a rejection under `policy`.
    pub fn error_text<'a>(&'a self, policy: &'a QuotaPolicy) -> &'a str {
        policy.error_text().unwrap_or(&self.default_error_text)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }
}
