//! Timing constants and limits for the proctored quiz controller
//!
//! Defaults for every tunable in [`crate::config`] live here, together with
//! the fixed values the state machines rely on (tick rate, cache keys and
//! endpoint paths).

/// Countdown timer constants
pub mod countdown {
    /// Interval between two countdown ticks in milliseconds
    pub const TICK_INTERVAL_MILLIS: u64 = 1000;
    /// Remaining seconds at or below which the countdown is shown as a caution
    pub const CAUTION_THRESHOLD_SECONDS: u64 = 180;
    /// Remaining seconds at or below which the countdown is shown as critical
    pub const CRITICAL_THRESHOLD_SECONDS: u64 = 60;
}

/// Integrity monitor constants
pub mod integrity {
    /// Default grace period after activation before violations are counted, in milliseconds
    pub const DEFAULT_GRACE_PERIOD_MILLIS: u64 = 5000;
    /// Minimum allowed grace period in milliseconds
    pub const MIN_GRACE_PERIOD_MILLIS: u64 = 1000;
    /// Maximum allowed grace period in milliseconds
    pub const MAX_GRACE_PERIOD_MILLIS: u64 = 30_000;
    /// Default delay before re-entering full-screen after an explicit exit, in milliseconds
    pub const DEFAULT_FULLSCREEN_RETRY_MILLIS: u64 = 300;
    /// Minimum allowed full-screen re-entry delay in milliseconds
    pub const MIN_FULLSCREEN_RETRY_MILLIS: u64 = 100;
    /// Maximum allowed full-screen re-entry delay in milliseconds
    pub const MAX_FULLSCREEN_RETRY_MILLIS: u64 = 5000;
}

/// Result publication polling constants
pub mod result {
    /// Default interval between two result polls in milliseconds
    pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 10_000;
    /// Minimum allowed poll interval in milliseconds
    pub const MIN_POLL_INTERVAL_MILLIS: u64 = 1000;
    /// Maximum allowed poll interval in milliseconds
    pub const MAX_POLL_INTERVAL_MILLIS: u64 = 300_000;
}

/// HTTP client constants
pub mod client {
    /// Base URL used when none is configured
    pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
    /// Default per-request timeout in milliseconds
    pub const DEFAULT_REQUEST_TIMEOUT_MILLIS: u64 = 15_000;
    /// Prefix of environment variables read by [`crate::config::ClientConfig::load`]
    pub const ENV_PREFIX: &str = "PROCTOR";
    /// Header carrying the finish request idempotency key
    pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
}

/// Native driver constants
pub mod driver {
    /// Default time shutdown waits for calls still in flight, in milliseconds
    pub const DEFAULT_DRAIN_TIMEOUT_MILLIS: u64 = 15_000;
}

/// Retry constants for persist-answer and finish calls
pub mod retry {
    /// Default number of attempts, including the first one
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
    /// Upper bound on configured attempts
    pub const MAX_ATTEMPTS: u32 = 10;
    /// Default backoff before the first retry in milliseconds
    pub const DEFAULT_BASE_BACKOFF_MILLIS: u64 = 250;
    /// Default cap on the backoff between two attempts in milliseconds
    pub const DEFAULT_MAX_BACKOFF_MILLIS: u64 = 4000;
    /// Default upper bound of the random jitter added to each backoff in milliseconds
    pub const DEFAULT_JITTER_MILLIS: u64 = 100;
}

/// Endpoint paths relative to the configured base URL
pub mod endpoints {
    /// Activates a session for the authenticated participant
    pub const START: &str = "/api/student/start";
    /// Fetches the question set and session metadata
    pub const QUESTIONS: &str = "/api/student/questions";
    /// Persists one answer
    pub const SUBMIT_ANSWER: &str = "/api/student/submit-answer";
    /// Finishes the session
    pub const FINISH: &str = "/api/student/finish";
    /// Fetches the (possibly unpublished) result
    pub const RESULT: &str = "/api/student/result";
}

/// Keys of the client-local session cache
pub mod cache {
    /// Server-issued session identifier
    pub const SESSION_ID: &str = "session_id";
    /// Authoritative start time, RFC 3339
    pub const START_TIME: &str = "start_time";
    /// Session duration in whole minutes
    pub const DURATION_MINUTES: &str = "duration_minutes";
    /// Number of questions in the session
    pub const TOTAL_QUESTIONS: &str = "total_questions";
}
