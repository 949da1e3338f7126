#![forbid(unsafe_code)]

//! Runtime engine for executing Waymark playbooks.
//!
//! Parsing and validation live in `waymark-core`; checkpoint persistence lives
//! in `waymark-store`. This crate owns everything between: sessions and auth,
//! the HTTP client seam, retry and circuit-breaker policy, and the engine that
//! walks phases and steps.

pub mod breaker;
pub mod engine;
pub mod events;
pub mod http;
pub mod retry;
pub mod session;

pub use crate::breaker::{Admission, BreakerRegistry, BreakerState, CircuitBreaker};
pub use crate::engine::{
    checkpoint_key, CheckpointManager, Engine, EngineConfig, EngineError, FinalStatus, RunOptions,
    RunReport, StepError,
};
pub use crate::events::{CompositeObserver, Event, NoopObserver, Observer, StdoutObserver};
pub use crate::http::{HttpClient, HttpError, HttpRequestParts, HttpResponseParts, ReqwestHttpClient};
pub use crate::retry::{decide_retry, RequestError, RetryDecision, RetryReason};
pub use crate::session::{AuthError, EffectivePolicy, Session, SessionError, SessionSet};
