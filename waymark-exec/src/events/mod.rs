//! Run-time reporting surface.
//!
//! The engine narrates a run through [`Observer::notify`]; sinks decide what
//! to do with each [`Event`]. Observer failures never affect the run.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        phases: usize,
    },
    RunFinished {
        run_id: Uuid,
        status: String,
        duration_ms: u64,
    },
    PhaseStarted {
        run_id: Uuid,
        phase: String,
        parallel: bool,
    },
    PhaseFinished {
        run_id: Uuid,
        phase: String,
    },
    StepStarted {
        run_id: Uuid,
        phase: String,
        step: String,
    },
    StepSucceeded {
        run_id: Uuid,
        phase: String,
        step: String,
    },
    StepFailed {
        run_id: Uuid,
        phase: String,
        step: String,
        error: String,
        will_abort: bool,
    },
    RequestStarted {
        run_id: Uuid,
        step: String,
        method: String,
        url: String,
        attempt: usize,
    },
    RequestFinished {
        run_id: Uuid,
        step: String,
        status: u16,
        duration_ms: u64,
        attempt: usize,
    },
    RetryScheduled {
        run_id: Uuid,
        step: String,
        attempt: usize,
        delay_ms: u64,
        reason: String,
    },
    BreakerTransition {
        run_id: Uuid,
        session: String,
        from: String,
        to: String,
    },
    CheckpointSaved {
        run_id: Uuid,
        phase: i32,
        step: i32,
    },
    CheckpointRestored {
        run_id: Uuid,
        phase: i32,
        step: i32,
    },
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn notify(&self, event: &Event);
}

/// Prints one JSON object per line.
pub struct StdoutObserver;

#[async_trait]
impl Observer for StdoutObserver {
    async fn notify(&self, event: &Event) {
        println!("{}", serde_json::to_string(event).unwrap_or_default());
    }
}

#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn Observer>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }
}

#[async_trait]
impl Observer for CompositeObserver {
    async fn notify(&self, event: &Event) {
        join_all(self.observers.iter().map(|o| o.notify(event))).await;
    }
}

pub struct NoopObserver;

#[async_trait]
impl Observer for NoopObserver {
    async fn notify(&self, _event: &Event) {}
}
