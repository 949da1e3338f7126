//! Per-session circuit breaker.
//!
//! One breaker guards all traffic to a session for the duration of a run,
//! shared across parallel steps and iterations. Time and randomness are
//! passed in by the caller so state transitions are deterministic in tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use waymark_core::BreakerSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: usize,
    /// Jittered reopen deadline, fixed once when the breaker opens.
    reset_deadline: Option<SystemTime>,
    /// Set while the single half-open probe is outstanding.
    probe_in_flight: bool,
}

/// Outcome of asking the breaker for permission to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Call may proceed; the breaker is closed.
    Closed,
    /// Call may proceed as the single half-open probe.
    Probe,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    session: String,
    cfg: BreakerSpec,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(session: impl Into<String>, cfg: BreakerSpec) -> Self {
        Self {
            session: session.into(),
            cfg,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                reset_deadline: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Gate a call. `Err(retry_in)` means the call must fail fast without
    /// any network I/O.
    ///
    /// The first caller to arrive after the reset deadline flips the breaker
    /// to half-open and becomes its probe; everyone else is refused until the
    /// probe resolves.
    pub fn try_acquire(&self, now: SystemTime) -> Result<Admission, Duration> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(Admission::Closed),
            BreakerState::Open => {
                let deadline = match inner.reset_deadline {
                    Some(d) => d,
                    None => {
                        // Open without a deadline cannot happen; recover by
                        // treating the breaker as due for a probe.
                        now
                    }
                };
                if now < deadline {
                    return Err(deadline
                        .duration_since(now)
                        .unwrap_or(Duration::ZERO));
                }
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = true;
                Ok(Admission::Probe)
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(Duration::ZERO)
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    /// Record a successful attempt. Closes the breaker if this was the
    /// half-open probe; always resets the consecutive-failure count.
    ///
    /// Returns the state after the update so callers can report transitions.
    pub fn record_success(&self) -> BreakerState {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.reset_deadline = None;
            inner.probe_in_flight = false;
        }
        inner.state
    }

    /// Resolve an admitted probe whose outcome said nothing about the
    /// server's health: an auth rejection, throttling, or a failure before
    /// the request ever reached the wire. The breaker stays half-open with
    /// no probe outstanding, so the next caller becomes the probe.
    ///
    /// Returns the state after the update so callers can report transitions.
    pub fn release_probe(&self) -> BreakerState {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
        inner.state
    }

    /// Record a failed attempt that counts against the breaker.
    ///
    /// Returns the state after the update so callers can report transitions.
    pub fn record_failure(
        &self,
        now: SystemTime,
        rand_f64: impl Fn() -> f64,
    ) -> BreakerState {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.cfg.failure_threshold as usize {
                    self.open(&mut inner, now, rand_f64);
                }
            }
            BreakerState::HalfOpen => {
                // Probe failed: reopen with a fresh jittered deadline.
                inner.probe_in_flight = false;
                self.open(&mut inner, now, rand_f64);
            }
            BreakerState::Open => {
                // A call admitted before the breaker opened finished late.
                // The deadline set at open time stands.
                inner.consecutive_failures += 1;
            }
        }
        inner.state
    }

    fn open(&self, inner: &mut BreakerInner, now: SystemTime, rand_f64: impl Fn() -> f64) {
        let reset = self.cfg.reset_seconds * (1.0 + self.cfg.jitter * rand_f64());
        inner.state = BreakerState::Open;
        inner.reset_deadline = Some(now + Duration::from_secs_f64(reset.max(0.0)));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lazily-created breakers, one per session, shared for the whole run.
///
/// The spec supplied on first use wins; a step-level override therefore
/// applies only when that step is the first to touch the session.
#[derive(Default)]
pub struct BreakerRegistry {
    inner: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_session(&self, session: &str, cfg: &BreakerSpec) -> Arc<CircuitBreaker> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(session.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(session, cfg.clone())))
            .clone()
    }
}
