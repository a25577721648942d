//! In-process request throttling.
//!
//! Each request is identified by the caller's address and the action it
//! invokes. Every action may carry a quota of `count` requests per `window`;
//! the [`RateLimiter`] admits the first `count` requests of a window per
//! caller and rejects the rest until the window rolls over. Idle counters are
//! swept opportunistically as traffic arrives, so memory stays bounded
//! without a background task.

pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod resolver;
pub mod response;
pub mod server;
pub mod sweeper;
pub mod throttler;

pub use config::{Config, ThrottleOptions};
pub use counter::{ActionId, Decision};
pub use error::{ThrottlerError, ThrottlerResult};
pub use rate_limit_config::{QuotaPolicy, QuotaRule, RateLimitConfig};
pub use rate_limiter::RateLimiter;
pub use resolver::PolicyResolver;
pub use server::create_app;
pub use throttler::Throttler;
