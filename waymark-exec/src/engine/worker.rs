//! Drives one request through the resilience stack: breaker gate, auth,
//! HTTP attempt, classification, breaker bookkeeping, retry decision, sleep,
//! repeat.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::breaker::{Admission, BreakerState, CircuitBreaker};
use crate::engine::request::PreparedRequest;
use crate::engine::StepError;
use crate::events::{Event, Observer};
use crate::http::{HttpClient, HttpRequestParts};
use crate::retry::{classify_status, decide_retry, RequestError, RetryDecision};
use crate::session::{EffectivePolicy, Session};

/// Response of a resolved attempt chain. The body is parsed JSON, or `Null`
/// when the payload is empty or not JSON; status and headers are always
/// available to extractions either way.
#[derive(Debug, Clone)]
pub(crate) struct StepResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

pub(crate) struct ResilientClient<'a> {
    pub http: &'a dyn HttpClient,
    pub observer: &'a dyn Observer,
    pub session: &'a Session,
    pub policy: &'a EffectivePolicy,
    pub breaker: Option<Arc<CircuitBreaker>>,
    pub cancel: &'a CancellationToken,
    pub run_id: Uuid,
    pub step: &'a str,
}

impl ResilientClient<'_> {
    /// Run the attempt chain to a final outcome. A refused breaker gate is
    /// terminal for the whole chain; retries sleep between attempts and give
    /// up early if the run is cancelled.
    pub(crate) async fn execute(&self, req: &PreparedRequest) -> Result<StepResponse, StepError> {
        let mut attempt_no = 1usize;
        loop {
            let mut holds_probe = false;
            if let Some(breaker) = &self.breaker {
                let before = breaker.state();
                match breaker.try_acquire(SystemTime::now()) {
                    Ok(Admission::Closed) => {}
                    Ok(Admission::Probe) => {
                        holds_probe = true;
                        self.note_transition(breaker, before, BreakerState::HalfOpen)
                            .await;
                    }
                    Err(retry_in) => {
                        return Err(RequestError::CircuitOpen {
                            session: breaker.session().to_string(),
                            retry_in,
                        }
                        .into());
                    }
                }
            }

            let outcome = match self.attempt(req, attempt_no).await {
                Ok(outcome) => outcome,
                Err(plumbing) => {
                    // The attempt never produced a classifiable exchange
                    // (auth refresh failed). A held probe must not stay
                    // outstanding or the breaker would refuse every later
                    // caller with nothing left to resolve it.
                    self.release_probe(holds_probe);
                    return Err(plumbing);
                }
            };

            match outcome {
                Ok(response) => {
                    self.note_breaker_success().await;
                    return Ok(response);
                }
                Err(error) => {
                    self.note_breaker_failure(&error, holds_probe).await;
                    match decide_retry(&self.policy.retry, attempt_no, &error) {
                        RetryDecision::Stop { .. } => return Err(error.into()),
                        RetryDecision::RetryAfter { delay, reason } => {
                            self.observer
                                .notify(&Event::RetryScheduled {
                                    run_id: self.run_id,
                                    step: self.step.to_string(),
                                    attempt: attempt_no,
                                    delay_ms: delay.as_millis() as u64,
                                    reason: reason.to_string(),
                                })
                                .await;
                            tokio::select! {
                                _ = self.cancel.cancelled() => return Err(StepError::Cancelled),
                                _ = tokio::time::sleep(delay) => {}
                            }
                            attempt_no += 1;
                        }
                    }
                }
            }
        }
    }

    /// One attempt. The outer error is non-retryable plumbing (auth refresh
    /// failed); the inner one is the classification the retry policy acts on.
    async fn attempt(
        &self,
        req: &PreparedRequest,
        attempt_no: usize,
    ) -> Result<Result<StepResponse, RequestError>, StepError> {
        // Auth first so an explicit step header wins over the session's.
        let mut headers = BTreeMap::new();
        self.session.authorize(&mut headers).await?;
        for (k, v) in &req.headers {
            headers.insert(k.clone(), v.clone());
        }

        self.observer
            .notify(&Event::RequestStarted {
                run_id: self.run_id,
                step: self.step.to_string(),
                method: req.method.clone(),
                url: req.url.to_string(),
                attempt: attempt_no,
            })
            .await;

        let started = Instant::now();
        let sent = self
            .http
            .send(
                HttpRequestParts {
                    method: req.method.clone(),
                    url: req.url.clone(),
                    headers,
                    body: req.body.clone(),
                    validate_ssl: self.policy.validate_ssl,
                },
                self.policy.timeout,
            )
            .await;

        Ok(match sent {
            Ok(resp) => {
                self.observer
                    .notify(&Event::RequestFinished {
                        run_id: self.run_id,
                        step: self.step.to_string(),
                        status: resp.status,
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempt: attempt_no,
                    })
                    .await;
                match classify_status(
                    resp.status,
                    &resp.headers,
                    &self.policy.rate_limit,
                    SystemTime::now(),
                ) {
                    Ok(()) => {
                        let body = serde_json::from_slice(&resp.body).unwrap_or(Value::Null);
                        Ok(StepResponse {
                            status: resp.status,
                            headers: resp.headers,
                            body,
                        })
                    }
                    Err(error) => Err(error),
                }
            }
            Err(source) => Err(RequestError::Transport { source }),
        })
    }

    async fn note_breaker_success(&self) {
        if let Some(breaker) = &self.breaker {
            let before = breaker.state();
            let after = breaker.record_success();
            self.note_transition(breaker, before, after).await;
        }
    }

    async fn note_breaker_failure(&self, error: &RequestError, holds_probe: bool) {
        if let Some(breaker) = &self.breaker {
            if !error.counts_for_breaker() {
                // Auth and client errors say nothing about the server; a
                // probe that hit one goes back up for grabs.
                self.release_probe(holds_probe);
                return;
            }
            let before = breaker.state();
            let after = breaker.record_failure(SystemTime::now(), || fastrand::f64());
            self.note_transition(breaker, before, after).await;
        }
    }

    fn release_probe(&self, holds_probe: bool) {
        if holds_probe {
            if let Some(breaker) = &self.breaker {
                breaker.release_probe();
            }
        }
    }

    async fn note_transition(
        &self,
        breaker: &CircuitBreaker,
        before: BreakerState,
        after: BreakerState,
    ) {
        if before != after {
            self.observer
                .notify(&Event::BreakerTransition {
                    run_id: self.run_id,
                    session: breaker.session().to_string(),
                    from: before.as_str().to_string(),
                    to: after.as_str().to_string(),
                })
                .await;
        }
    }
}
