use crate::error::{ThrottlerError, ThrottlerResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use validator::{Validate, ValidationError};

static ACTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+ /\S*$").expect("valid action pattern"));

static GROUP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/\S*$").expect("valid group pattern"));

/// Validator for action ids of the form `"METHOD /path"`.
pub fn validate_action_id(action: &str) -> Result<(), ValidationError> {
    if !ACTION_PATTERN.is_match(action) {
        return Err(ValidationError::new("action_format"));
    }
    Ok(())
}

fn default_count() -> u32 {
    1
}

fn default_window() -> Duration {
    Duration::from_secs(1)
}

fn validate_window(window: &Duration) -> Result<(), ValidationError> {
    if window.is_zero() {
        return Err(ValidationError::new("window_must_be_positive"));
    }
    Ok(())
}

/// Per-action quota declaration, as written in a policy file.
///
/// Defaults to one request per second with the service-wide error text.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct QuotaRule {
    #[serde(default = "default_count")]
    #[validate(range(min = 1))]
    pub count: u32,

    #[serde(default = "default_window", with = "humantime_serde")]
    #[validate(custom(function = "validate_window"))]
    pub window: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub error_text: Option<String>,
}

impl Default for QuotaRule {
    fn default() -> Self {
        Self {
            count: default_count(),
            window: default_window(),
            error_text: None,
        }
    }
}

impl QuotaRule {
    pub fn new(count: u32, window: Duration) -> Self {
        Self {
            count,
            window,
            error_text: None,
        }
    }

    pub fn with_error_text(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }
}

/// A resolved, validated quota: at most `max_count` requests per `window`.
///
/// Counter entries capture the policy they were created with and keep it
/// for their whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    max_count: NonZeroU32,
    window: Duration,
    error_text: Option<String>,
}

impl QuotaPolicy {
    pub fn new(
        max_count: u32,
        window: Duration,
        error_text: Option<String>,
    ) -> ThrottlerResult<Self> {
        let max_count = NonZeroU32::new(max_count).ok_or_else(|| {
            ThrottlerError::InvalidPolicy("count must be greater than 0".to_string())
        })?;
        if window.is_zero() {
            return Err(ThrottlerError::InvalidPolicy(
                "window must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_count,
            window,
            error_text,
        })
    }

    pub fn max_count(&self) -> u32 {
        self.max_count.get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The policy's own message, `None` when the service default applies.
    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }
}

impl TryFrom<QuotaRule> for QuotaPolicy {
    type Error = ThrottlerError;

    fn try_from(rule: QuotaRule) -> Result<Self, Self::Error> {
        rule.validate()?;
        QuotaPolicy::new(rule.count, rule.window, rule.error_text)
    }
}

/// Quota declarations for a whole service.
///
/// `actions` are keyed by action id (`"POST /auth/login"`). `groups` are
/// keyed by a route prefix (`"/auth"`) and apply to every action below it
/// that has no rule of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub actions: HashMap<String, QuotaRule>,
    #[serde(default)]
    pub groups: HashMap<String, QuotaRule>,
}

impl RateLimitConfig {
    pub fn from_json(json: &str) -> ThrottlerResult<Self> {
        let config: RateLimitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn set_action(&mut self, action: impl Into<String>, rule: QuotaRule) {
        self.actions.insert(action.into(), rule);
    }

    pub fn set_group(&mut self, prefix: impl Into<String>, rule: QuotaRule) {
        self.groups.insert(prefix.into(), rule);
    }

    /// Check every key and rule. Called on load; invalid files never reach
    /// the throttle.
    pub fn validate(&self) -> ThrottlerResult<()> {
        for (action, rule) in &self.actions {
            if validate_action_id(action).is_err() {
                return Err(ThrottlerError::InvalidPolicy(format!(
                    "action '{action}' must look like 'METHOD /path'"
                )));
            }
            rule.validate().map_err(|errors| {
                ThrottlerError::InvalidPolicy(format!("action '{action}': {errors}"))
            })?;
        }

        for (prefix, rule) in &self.groups {
            if !GROUP_PATTERN.is_match(prefix) {
                return Err(ThrottlerError::InvalidPolicy(format!(
                    "group '{prefix}' must be a path starting with '/'"
                )));
            }
            rule.validate().map_err(|errors| {
                ThrottlerError::InvalidPolicy(format!("group '{prefix}': {errors}"))
            })?;
        }

        Ok(())
    }
}
