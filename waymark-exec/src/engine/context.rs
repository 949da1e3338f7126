use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waymark_core::VariableStore;

use crate::breaker::BreakerRegistry;
use crate::session::SessionSet;

/// Everything a run shares across its phases, steps, and iterations.
///
/// Owned by [`super::Engine::run`] and dropped when the run ends; nothing in
/// here outlives the run, so two runs never share breakers or variables.
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub vars: VariableStore,
    pub sessions: SessionSet,
    pub breakers: BreakerRegistry,
    /// Cancelled on abort or by the caller's handle in
    /// [`super::RunOptions`]; workers check it before dispatch and during
    /// backoff waits.
    pub cancel: CancellationToken,
    /// Caps in-flight requests across the whole run. Acquired around request
    /// execution only, never held by a task that spawns permit-holders, so
    /// nested parallelism cannot deadlock on it.
    pub permits: Arc<Semaphore>,
    pub started_at: Instant,
    ignored_failures: AtomicUsize,
}

impl RunContext {
    pub fn new(
        run_id: Uuid,
        vars: VariableStore,
        sessions: SessionSet,
        max_parallel: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            vars,
            sessions,
            breakers: BreakerRegistry::new(),
            cancel,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            started_at: Instant::now(),
            ignored_failures: AtomicUsize::new(0),
        }
    }

    pub fn record_ignored(&self) {
        self.ignored_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ignored(&self) -> usize {
        self.ignored_failures.load(Ordering::Relaxed)
    }
}
