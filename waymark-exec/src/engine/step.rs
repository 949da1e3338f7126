//! Runs one step: resolves its iteration collection, executes one request
//! per element, and writes extractions back into the shared store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;

use waymark_core::{
    parse_iterate, parse_template, ExtractPath, OnError, RenderError, Scope, StepSpec,
};

use crate::engine::context::RunContext;
use crate::engine::request::build_request;
use crate::engine::runner::drain_with_grace;
use crate::engine::worker::{ResilientClient, StepResponse};
use crate::engine::StepError;
use crate::events::{Event, Observer};
use crate::http::HttpClient;

/// Owned inputs for one step execution, cheap enough to move into a task.
pub(crate) struct StepTask {
    pub ctx: Arc<RunContext>,
    pub http: Arc<dyn HttpClient>,
    pub observer: Arc<dyn Observer>,
    pub phase: String,
    pub spec: StepSpec,
    pub grace: Duration,
}

/// How the step resolved from the run's point of view. Ignored failures
/// still count as `Completed`; `Failed` aborts the run.
pub(crate) enum StepStatus {
    Completed,
    Failed(StepError),
}

pub(crate) async fn run_step(task: StepTask) -> StepStatus {
    task.observer
        .notify(&Event::StepStarted {
            run_id: task.ctx.run_id,
            phase: task.phase.clone(),
            step: task.spec.name.clone(),
        })
        .await;

    match drive(&task).await {
        Ok(0) => {
            task.observer
                .notify(&Event::StepSucceeded {
                    run_id: task.ctx.run_id,
                    phase: task.phase.clone(),
                    step: task.spec.name.clone(),
                })
                .await;
            StepStatus::Completed
        }
        // Some iterations were ignored failures; their StepFailed events
        // already told the story, so no success event on top.
        Ok(_) => StepStatus::Completed,
        // Cancellation is never an ignorable failure; the run is ending.
        Err(err)
            if task.spec.on_error == OnError::Ignore
                && !matches!(err, StepError::Cancelled) =>
        {
            task.ctx.record_ignored();
            emit_failure(&task, &err, false).await;
            StepStatus::Completed
        }
        Err(err) => {
            emit_failure(&task, &err, true).await;
            StepStatus::Failed(err)
        }
    }
}

async fn emit_failure(task: &StepTask, err: &StepError, will_abort: bool) {
    task.observer
        .notify(&Event::StepFailed {
            run_id: task.ctx.run_id,
            phase: task.phase.clone(),
            step: task.spec.name.clone(),
            error: err.to_string(),
            will_abort,
        })
        .await;
}

/// Execute every iteration of the step. Returns the number of ignored
/// failures; an `Err` is a failure the step could not absorb (setup errors,
/// or any iteration failure when `on_error: abort`).
async fn drive(task: &StepTask) -> Result<usize, StepError> {
    let spec = &task.spec;

    // Resolve the collection once, before any request; iterations see the
    // store as it was at step start.
    let iterations: Vec<BTreeMap<String, Value>> = match &spec.iterate {
        None => vec![BTreeMap::new()],
        Some(clause_text) => {
            let clause = parse_iterate(clause_text)?;
            let items = clause.resolve(&task.ctx.vars.scope())?;
            items
                .into_iter()
                .map(|item| BTreeMap::from([(clause.var.clone(), item)]))
                .collect()
        }
    };

    // Empty collection: the step succeeds without sending anything.
    if iterations.is_empty() {
        return Ok(0);
    }

    if spec.parallel && iterations.len() > 1 {
        run_parallel_iterations(task, iterations).await
    } else {
        run_sequential_iterations(task, iterations).await
    }
}

async fn run_sequential_iterations(
    task: &StepTask,
    iterations: Vec<BTreeMap<String, Value>>,
) -> Result<usize, StepError> {
    let mut ignored = 0usize;
    for locals in iterations {
        if task.ctx.cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        match execute_iteration(&task.ctx, &task.http, &task.observer, &task.spec, locals).await {
            Ok(()) => {}
            Err(err)
                if task.spec.on_error == OnError::Ignore
                    && !matches!(err, StepError::Cancelled) =>
            {
                task.ctx.record_ignored();
                emit_failure(task, &err, false).await;
                ignored += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(ignored)
}

async fn run_parallel_iterations(
    task: &StepTask,
    iterations: Vec<BTreeMap<String, Value>>,
) -> Result<usize, StepError> {
    let mut set: JoinSet<Result<(), StepError>> = JoinSet::new();
    for locals in iterations {
        let ctx = task.ctx.clone();
        let http = task.http.clone();
        let observer = task.observer.clone();
        let spec = task.spec.clone();
        set.spawn(async move {
            execute_iteration(&ctx, &http, &observer, &spec, locals).await
        });
    }

    let mut ignored = 0usize;
    let mut fatal: Option<StepError> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if task.spec.on_error == OnError::Ignore
                    && !matches!(err, StepError::Cancelled)
                {
                    task.ctx.record_ignored();
                    emit_failure(task, &err, false).await;
                    ignored += 1;
                } else {
                    fatal = Some(err);
                    break;
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                fatal = Some(StepError::Join(e.to_string()));
                break;
            }
        }
    }

    if let Some(err) = fatal {
        // Stop siblings: cancel, let in-flight requests wind down, then cut
        // off whatever is left.
        task.ctx.cancel.cancel();
        drain_with_grace(&mut set, task.grace).await;
        return Err(err);
    }
    Ok(ignored)
}

/// The per-request pipeline: render, gate, authorize, send, extract.
async fn execute_iteration(
    ctx: &RunContext,
    http: &Arc<dyn HttpClient>,
    observer: &Arc<dyn Observer>,
    spec: &StepSpec,
    locals: BTreeMap<String, Value>,
) -> Result<(), StepError> {
    if ctx.cancel.is_cancelled() {
        return Err(StepError::Cancelled);
    }

    let session = ctx.sessions.get(&spec.session)?;
    let policy = session.effective_for(spec);
    let scope = ctx.vars.scope_with(locals);
    let prepared = build_request(spec, &session, &scope)?;
    let breaker = policy
        .breaker
        .as_ref()
        .map(|cfg| ctx.breakers.for_session(&policy.breaker_key, cfg));

    let _permit = ctx
        .permits
        .acquire()
        .await
        .map_err(|_| StepError::Cancelled)?;

    let client = ResilientClient {
        http: http.as_ref(),
        observer: observer.as_ref(),
        session: session.as_ref(),
        policy: &policy,
        breaker,
        cancel: &ctx.cancel,
        run_id: ctx.run_id,
        step: &spec.name,
    };
    let response = client.execute(&prepared).await?;

    store_extractions(ctx, spec, &scope, &response)
}

/// Apply every `store:` entry of the step to the response. The target name
/// is itself a template (loop variables in scope); a trailing `+` on the raw
/// name selects append mode.
fn store_extractions(
    ctx: &RunContext,
    spec: &StepSpec,
    scope: &Scope<'_>,
    response: &StepResponse,
) -> Result<(), StepError> {
    for (raw_name, raw_path) in &spec.store {
        let (name_template, append) = match raw_name.strip_suffix('+') {
            Some(stripped) => (stripped, true),
            None => (raw_name.as_str(), false),
        };
        let name = parse_template(name_template)
            .map_err(RenderError::from)?
            .render(scope)?;
        let path = ExtractPath::parse(raw_path)?;
        let value = path
            .extract(response.status, &response.headers, &response.body)
            .map_err(|source| StepError::Extract {
                target: name.clone(),
                source,
            })?;
        if append {
            ctx.vars.append(&name, value);
        } else {
            ctx.vars.set(name, value);
        }
    }
    Ok(())
}
