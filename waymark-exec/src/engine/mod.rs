//! The run loop: takes a validated [`Playbook`], walks its phases, and
//! reports how the run ended.

mod checkpoint;
mod context;
mod request;
mod runner;
mod step;
mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waymark_core::{
    ExtractParseError, ExtractionError, IterateError, Playbook, RenderError, VariableStore,
};
use waymark_store::StoreError;

use crate::events::{Event, Observer};
use crate::http::HttpClient;
use crate::retry::RequestError;
use crate::session::{AuthError, SessionError, SessionSet};

use context::RunContext;

pub use checkpoint::{checkpoint_key, CheckpointManager};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on concurrently executing requests across the run.
    pub max_parallel: usize,
    /// How long an abort waits for in-flight work before cutting it off.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pick up from a previous checkpoint when one exists. Off clears any
    /// stale checkpoint before starting fresh.
    pub resume: bool,
    pub run_id: Option<Uuid>,
    /// Initial variables, seeded before any checkpoint restore; restored
    /// entries overwrite seeds key by key.
    pub variables: BTreeMap<String, Value>,
    /// Cancelled by the caller to stop the run from outside (a SIGINT
    /// handler, a supervising task). The run ends `Aborted` with the last
    /// committed checkpoint left in place for a later resume.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: true,
            run_id: None,
            variables: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalStatus {
    Success,
    PartialFailure { ignored_failures: usize },
    Aborted,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: FinalStatus,
    pub phases_run: usize,
    pub steps_run: usize,
    pub failures_ignored: usize,
    pub duration: Duration,
}

/// Why a single step (or one of its iterations) failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("iterate: {0}")]
    Iterate(#[from] IterateError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("auth: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("invalid store path: {0}")]
    ExtractSpec(#[from] ExtractParseError),
    #[error("store '{target}': {source}")]
    Extract {
        target: String,
        #[source]
        source: ExtractionError,
    },
    #[error("built URL '{url}' does not parse: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to encode request body: {0}")]
    BodyEncode(String),
    #[error("iteration task failed: {0}")]
    Join(String),
    #[error("cancelled")]
    Cancelled,
}

/// Failures of the run machinery itself, as opposed to step outcomes that
/// the playbook's `on_error` settings govern.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session setup failed: {0}")]
    Session(#[from] SessionError),
    #[error("checkpoint store: {0}")]
    Store(#[from] StoreError),
    #[error("checkpoint does not match this playbook: {0}")]
    CheckpointMismatch(String),
    #[error("worker task failed: {0}")]
    Join(String),
}

pub struct Engine {
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(
        http: Arc<dyn HttpClient>,
        observer: Arc<dyn Observer>,
        checkpoints: CheckpointManager,
        config: EngineConfig,
    ) -> Self {
        Self {
            http,
            observer,
            checkpoints,
            config,
        }
    }

    /// Execute the playbook to a final status.
    ///
    /// `Ok` covers every run that reached a verdict, including aborted ones;
    /// `Err` means the machinery failed (checkpoint store, session setup,
    /// task join) or the checkpoint belongs to a different playbook.
    pub async fn run(
        &self,
        playbook: &Playbook,
        opts: RunOptions,
    ) -> Result<RunReport, EngineError> {
        let run_id = opts.run_id.unwrap_or_else(Uuid::new_v4);
        let content_hash = playbook.content_hash();

        let restored = if opts.resume {
            self.checkpoints.load().await?
        } else {
            self.checkpoints.clear().await?;
            None
        };
        let start = match &restored {
            Some(cp) => checkpoint::resume_position(cp, playbook, &content_hash)?,
            None => checkpoint::StartPosition::default(),
        };

        let vars = VariableStore::seeded(opts.variables);
        if let Some(cp) = &restored {
            for (name, value) in &cp.variables {
                vars.set(name.clone(), value.clone());
            }
        }

        // Sessions render their base URLs and credentials once, against the
        // restored store, before the first phase starts.
        let sessions = {
            let scope = vars.scope();
            SessionSet::build(playbook, &scope, self.http.clone())?
        };

        let ctx = Arc::new(RunContext::new(
            run_id,
            vars,
            sessions,
            self.config.max_parallel,
            opts.cancel,
        ));

        self.observer
            .notify(&Event::RunStarted {
                run_id,
                phases: playbook.phases.len(),
            })
            .await;
        if let Some(cp) = &restored {
            self.observer
                .notify(&Event::CheckpointRestored {
                    run_id,
                    phase: cp.phase_index,
                    step: cp.step_index,
                })
                .await;
        }

        let totals = runner::run_phases(self, &ctx, playbook, start, &content_hash).await?;

        let ignored = ctx.ignored();
        let status = if totals.aborted {
            FinalStatus::Aborted
        } else if ignored > 0 {
            FinalStatus::PartialFailure {
                ignored_failures: ignored,
            }
        } else {
            FinalStatus::Success
        };

        if !totals.aborted {
            self.checkpoints.clear().await?;
        }

        let duration = ctx.started_at.elapsed();
        self.observer
            .notify(&Event::RunFinished {
                run_id,
                status: status.as_str().to_string(),
                duration_ms: duration.as_millis() as u64,
            })
            .await;

        Ok(RunReport {
            run_id,
            status,
            phases_run: totals.phases_run,
            steps_run: totals.steps_run,
            failures_ignored: ignored,
            duration,
        })
    }
}
