use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::error::ThrottlerResult;
use crate::rate_limit_config::RateLimitConfig;

pub const DEFAULT_MAX_CACHE_SIZE: usize = 1024;
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_ERROR_TEXT: &str = "Too many requests, please try again later";

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

/// Service configuration, from command line flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "throttler", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// JSON file with per-action quota rules
    #[arg(long, env = "THROTTLE_POLICIES")]
    pub policies: Option<PathBuf>,

    /// Store size at which a sweep is forced before inserting a new counter
    #[arg(long, env = "THROTTLE_MAX_CACHE_SIZE", default_value_t = DEFAULT_MAX_CACHE_SIZE)]
    pub max_cache_size: usize,

    /// Minimum gap between time-triggered sweeps
    #[arg(long, env = "THROTTLE_CHECK_PERIOD", default_value = "10s", value_parser = parse_duration)]
    pub check_period: Duration,

    /// Message returned when a rule does not define its own
    #[arg(long, env = "THROTTLE_DEFAULT_ERROR", default_value = DEFAULT_ERROR_TEXT)]
    pub default_error_text: String,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn throttle_options(&self) -> ThrottleOptions {
        ThrottleOptions {
            max_cache_size: self.max_cache_size,
            check_period: self.check_period,
            default_error_text: self.default_error_text.clone(),
        }
    }

    /// Load the policy file, or an empty rule set when none is configured.
    pub fn load_policies(&self) -> ThrottlerResult<RateLimitConfig> {
        match &self.policies {
            Some(path) => RateLimitConfig::from_file(path),
            None => Ok(RateLimitConfig::default()),
        }
    }
}

/// Tuning of the throttle itself.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ThrottleOptions {
    #[validate(range(min = 1))]
    pub max_cache_size: usize,
    #[serde(with = "humantime_serde")]
    pub check_period: Duration,
    #[validate(length(min = 1))]
    pub default_error_text: String,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            check_period: DEFAULT_CHECK_PERIOD,
            default_error_text: DEFAULT_ERROR_TEXT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn arg(id: &str) -> clap::Arg {
        Config::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .cloned()
            .unwrap()
    }

    fn default_of(id: &str) -> String {
        arg(id).get_default_values()[0].to_string_lossy().into_owned()
    }

    // Built by hand so that THROTTLE_* variables in the environment cannot leak in.
    fn config_without_policies() -> Config {
        Config {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            policies: None,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            check_period: DEFAULT_CHECK_PERIOD,
            default_error_text: DEFAULT_ERROR_TEXT.to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_of("bind_addr"), "127.0.0.1:3000");
        assert_eq!(default_of("max_cache_size"), "1024");
        assert_eq!(parse_duration(&default_of("check_period")), Ok(DEFAULT_CHECK_PERIOD));
        assert_eq!(default_of("default_error_text"), DEFAULT_ERROR_TEXT);
        assert_eq!(default_of("log_level"), "info");
        assert!(arg("policies").get_default_values().is_empty());
    }

    #[test]
    fn test_env_names() {
        let env_of = |id: &str| arg(id).get_env().map(|env| env.to_string_lossy().into_owned());
        assert_eq!(env_of("bind_addr").as_deref(), Some("BIND_ADDR"));
        assert_eq!(env_of("policies").as_deref(), Some("THROTTLE_POLICIES"));
        assert_eq!(env_of("max_cache_size").as_deref(), Some("THROTTLE_MAX_CACHE_SIZE"));
        assert_eq!(env_of("check_period").as_deref(), Some("THROTTLE_CHECK_PERIOD"));
        assert_eq!(env_of("default_error_text").as_deref(), Some("THROTTLE_DEFAULT_ERROR"));
        assert_eq!(env_of("log_level").as_deref(), Some("LOG_LEVEL"));
    }

    #[test]
    fn test_flags() {
        let config = Config::parse_from([
            "throttler",
            "--bind-addr",
            "0.0.0.0:8080",
            "--max-cache-size",
            "16",
            "--check-period",
            "500ms",
            "--default-error-text",
            "busy",
        ]);
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        let options = config.throttle_options();
        assert_eq!(options.max_cache_size, 16);
        assert_eq!(options.check_period, Duration::from_millis(500));
        assert_eq!(options.default_error_text, "busy");
    }

    #[test]
    fn test_options_validation() {
        assert!(ThrottleOptions::default().validate().is_ok());

        let zero = ThrottleOptions {
            max_cache_size: 0,
            ..ThrottleOptions::default()
        };
        assert!(zero.validate().is_err());

        let blank = ThrottleOptions {
            default_error_text: String::new(),
            ..ThrottleOptions::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_missing_policy_file_is_empty() {
        let config = config_without_policies();
        let policies = config.load_policies().unwrap();
        assert!(policies.actions.is_empty());
        assert!(policies.groups.is_empty());
    }
}
