use std::time::Duration;

use waymark_core::RetrySpec;

use crate::retry::RequestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    NotRetryable,
    AttemptsExhausted,
    HttpStatus(u16),
    NetworkFailure,
    RetryAfterHeader,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRetryable => write!(f, "not retryable"),
            Self::AttemptsExhausted => write!(f, "attempts exhausted"),
            Self::HttpStatus(status) => write!(f, "http {status}"),
            Self::NetworkFailure => write!(f, "network failure"),
            Self::RetryAfterHeader => write!(f, "server retry-after"),
        }
    }
}

/// Decide whether the attempt that just failed should be retried, and how
/// long to wait first.
///
/// - `attempt_no`: 1-based number of the attempt that just finished; a policy
///   with `max_retries: n` allows `n + 1` attempts in total.
/// - Terminal errors (auth, other 4xx, open breaker) always stop.
/// - A server-requested delay (429 + parsed retry header) wins over backoff,
///   capped at `max_delay_seconds`.
/// - Otherwise the wait is `backoff_factor * 2^(attempt_no - 1)` seconds,
///   capped at `max_delay_seconds`; a zero factor retries immediately.
pub fn decide_retry(cfg: &RetrySpec, attempt_no: usize, error: &RequestError) -> RetryDecision {
    if error.is_terminal() {
        return RetryDecision::Stop {
            reason: RetryReason::NotRetryable,
        };
    }

    if let RequestError::Server { status } = error {
        if !cfg.is_retry_status(*status) {
            return RetryDecision::Stop {
                reason: RetryReason::HttpStatus(*status),
            };
        }
    }

    let max_attempts = cfg.max_retries.saturating_add(1) as usize;
    if attempt_no >= max_attempts {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    // Server-requested delay wins.
    if let RequestError::RateLimited {
        retry_after: Some(delay),
        ..
    } = error
    {
        return RetryDecision::RetryAfter {
            delay: clamp(*delay, max_delay(cfg)),
            reason: RetryReason::RetryAfterHeader,
        };
    }

    let exp = attempt_no.saturating_sub(1) as i32;
    let raw = cfg.backoff_factor * 2f64.powi(exp);
    let delay = Duration::from_secs_f64(raw.min(cfg.max_delay_seconds).max(0.0));

    let reason = match error.status() {
        Some(status) => RetryReason::HttpStatus(status),
        None => RetryReason::NetworkFailure,
    };
    RetryDecision::RetryAfter { delay, reason }
}

fn max_delay(cfg: &RetrySpec) -> Duration {
    Duration::from_secs_f64(cfg.max_delay_seconds.max(0.0))
}

fn clamp(delay: Duration, max: Duration) -> Duration {
    if delay > max {
        max
    } else {
        delay
    }
}
