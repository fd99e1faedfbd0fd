//! Tunable settings
//!
//! [`ControllerOptions`] shapes the state machine (grace period, re-entry
//! delay, persist-failure policy); [`ClientConfig`] describes how to reach
//! the exam server. Both validate their ranges with `garde`.

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

use crate::{
    constants::{client, integrity, result},
    retry::RetryConfig,
};

type ValidationResult = garde::Result;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

/// What happens when persisting an answer keeps failing in transit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistFailurePolicy {
    /// Report the lost answer and move on; a stalled timed attempt is worse
    #[default]
    Advance,
    /// Stay on the question until the answer is saved or the participant retries
    Block,
}

fn validate_millis<const MIN_MILLIS: u64, const MAX_MILLIS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    let millis = u64::try_from(val.as_millis()).unwrap_or(u64::MAX);
    if (MIN_MILLIS..=MAX_MILLIS).contains(&millis) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_MILLIS}ms,{MAX_MILLIS}ms]",
        )))
    }
}

fn validate_grace_period(val: &Duration) -> ValidationResult {
    validate_millis::<
        { integrity::MIN_GRACE_PERIOD_MILLIS },
        { integrity::MAX_GRACE_PERIOD_MILLIS },
    >("grace_period", val)
}

fn validate_fullscreen_retry_delay(val: &Duration) -> ValidationResult {
    validate_millis::<
        { integrity::MIN_FULLSCREEN_RETRY_MILLIS },
        { integrity::MAX_FULLSCREEN_RETRY_MILLIS },
    >("fullscreen_retry_delay", val)
}

fn validate_poll_interval(val: &Duration) -> ValidationResult {
    validate_millis::<{ result::MIN_POLL_INTERVAL_MILLIS }, { result::MAX_POLL_INTERVAL_MILLIS }>(
        "result_poll_interval",
        val,
    )
}

fn validate_base_url(val: &str) -> ValidationResult {
    if val.starts_with("http://") || val.starts_with("https://") {
        Ok(())
    } else {
        Err(garde::Error::new("base_url must be an http(s) URL"))
    }
}

/// Settings of one quiz controller
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ControllerOptions {
    /// Time after activation during which visibility loss is not counted
    #[garde(custom(|v, _| validate_grace_period(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub grace_period: Duration,
    /// Delay before re-entering full-screen after an explicit exit
    #[garde(custom(|v, _| validate_fullscreen_retry_delay(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub fullscreen_retry_delay: Duration,
    /// Interval between two result publication polls
    #[garde(custom(|v, _| validate_poll_interval(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub result_poll_interval: Duration,
    /// Behaviour after a persist call failed in transit
    #[garde(skip)]
    pub persist_failure_policy: PersistFailurePolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(integrity::DEFAULT_GRACE_PERIOD_MILLIS),
            fullscreen_retry_delay: Duration::from_millis(
                integrity::DEFAULT_FULLSCREEN_RETRY_MILLIS,
            ),
            result_poll_interval: Duration::from_millis(result::DEFAULT_POLL_INTERVAL_MILLIS),
            persist_failure_policy: PersistFailurePolicy::default(),
        }
    }
}

/// How to reach the exam server
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme, host and port of the server
    #[garde(custom(|v: &String, _| validate_base_url(v)))]
    pub base_url: String,
    /// Bearer token of the authenticated participant
    #[garde(length(min = 1))]
    pub token: String,
    /// Timeout applied to every request
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[garde(skip)]
    pub request_timeout: Duration,
    /// Retry bounds for persist and finish calls
    #[garde(dive)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: client::DEFAULT_BASE_URL.to_owned(),
            token: String::new(),
            request_timeout: Duration::from_millis(client::DEFAULT_REQUEST_TIMEOUT_MILLIS),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from `PROCTOR_*` environment variables
    ///
    /// Nested values use a double underscore, e.g. `PROCTOR_RETRY__MAX_ATTEMPTS`.
    /// Durations are given in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed or a value is
    /// out of range (including a missing token).
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::with_prefix(client::ENV_PREFIX))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, ConfigError> {
        let loaded: Self = config::Config::builder()
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        tracing::debug!(base_url = %loaded.base_url, "client configuration loaded");
        Ok(loaded)
    }

    /// Joins an endpoint path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}
