/// Retry policy for a session or step. Attempt count is `max_retries + 1`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySpec {
    pub max_retries: u32,

    /// Base for exponential backoff, in seconds. Zero means retry immediately.
    pub backoff_factor: f64,

    /// Ceiling for any single computed or server-supplied delay.
    pub max_delay_seconds: f64,

    /// Response statuses that count as retryable server failures.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff_factor: 0.0,
            max_delay_seconds: 60.0,
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetrySpec {
    pub fn is_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Circuit breaker policy, one breaker instance per session per run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSpec {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,

    /// Base open window before a probe is allowed, in seconds.
    pub reset_seconds: f64,

    /// Fraction in [0, 1]; open window is scaled by `1 + jitter * rand()`.
    pub jitter: f64,
}

impl Default for BreakerSpec {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_seconds: 30.0,
            jitter: 0.0,
        }
    }
}

/// How 429 responses are handled.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSpec {
    /// Prefer the server's advertised delay over computed backoff.
    pub use_server_retry_delay: bool,

    /// Header carrying the delay, delta-seconds or HTTP-date.
    pub retry_header: String,
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            use_server_retry_delay: true,
            retry_header: "Retry-After".to_string(),
        }
    }
}
