//! Attempt classification and retry policy.
//!
//! [`classify_status`] turns a finished HTTP exchange into a
//! [`RequestError`] (or success); [`decide_retry`] is the pure policy
//! function that says whether, and after how long, the next attempt runs.

mod decision;
mod headers;

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use waymark_core::RateLimitSpec;

use crate::http::HttpError;

pub use decision::{decide_retry, RetryDecision, RetryReason};
pub use headers::parse_retry_after;

/// How a single HTTP attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("transport failure: {source}")]
    Transport {
        #[source]
        source: HttpError,
    },
    #[error("server error: HTTP {status}")]
    Server { status: u16 },
    #[error("rate limited: HTTP {status}")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("authentication failed: HTTP {status}")]
    Auth { status: u16 },
    #[error("client error: HTTP {status}")]
    Client { status: u16 },
    #[error("circuit open for session '{session}', retry in {retry_in:?}")]
    CircuitOpen { session: String, retry_in: Duration },
}

impl RequestError {
    /// Status code of the failed attempt, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status }
            | Self::RateLimited { status, .. }
            | Self::Auth { status }
            | Self::Client { status } => Some(*status),
            Self::Transport { .. } | Self::CircuitOpen { .. } => None,
        }
    }

    /// Terminal errors stop the attempt chain no matter the retry policy.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Client { .. } | Self::CircuitOpen { .. }
        )
    }

    /// Whether this failure counts against the circuit breaker.
    ///
    /// Application-level rejections (auth, other 4xx) and throttling say
    /// nothing about the server's health; transport failures and server
    /// errors do.
    pub fn counts_for_breaker(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Server { .. })
    }
}

/// Classify a completed exchange by status code.
///
/// 2xx/3xx are success. 429 is rate limiting and captures the server's
/// requested delay when the policy honors it; 401/403 are terminal auth
/// failures; other 4xx are terminal client errors. Everything else (5xx and
/// oddities) is a server error whose retryability the retry policy decides.
pub fn classify_status(
    status: u16,
    headers: &BTreeMap<String, String>,
    rate_limit: &RateLimitSpec,
    now: SystemTime,
) -> Result<(), RequestError> {
    match status {
        200..=399 => Ok(()),
        429 => {
            let retry_after = if rate_limit.use_server_retry_delay {
                parse_retry_after(headers, &rate_limit.retry_header, now)
            } else {
                None
            };
            Err(RequestError::RateLimited {
                status,
                retry_after,
            })
        }
        401 | 403 => Err(RequestError::Auth { status }),
        400..=499 => Err(RequestError::Client { status }),
        _ => Err(RequestError::Server { status }),
    }
}
