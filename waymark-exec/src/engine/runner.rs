//! Phase scheduling: declaration order across phases, JoinSet fan-out within
//! a parallel phase, checkpoint commits at the positions resume depends on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use waymark_core::{PhaseSpec, Playbook};
use waymark_store::Checkpoint;

use crate::engine::checkpoint::StartPosition;
use crate::engine::context::RunContext;
use crate::engine::step::{run_step, StepStatus, StepTask};
use crate::engine::{Engine, EngineError};
use crate::events::Event;

pub(crate) struct PhaseTotals {
    pub aborted: bool,
    pub phases_run: usize,
    pub steps_run: usize,
}

pub(crate) async fn run_phases(
    engine: &Engine,
    ctx: &Arc<RunContext>,
    playbook: &Playbook,
    start: StartPosition,
    content_hash: &str,
) -> Result<PhaseTotals, EngineError> {
    let mut totals = PhaseTotals {
        aborted: false,
        phases_run: 0,
        steps_run: 0,
    };

    for (phase_index, phase) in playbook.phases.iter().enumerate() {
        if phase_index < start.phase {
            continue;
        }
        let skip_through = if phase_index == start.phase {
            start.skip_through_step
        } else {
            -1
        };
        // A phase whose last step is already committed has nothing to run.
        if skip_through >= 0 && skip_through as usize + 1 >= phase.steps.len() {
            continue;
        }

        totals.phases_run += 1;
        engine
            .observer
            .notify(&Event::PhaseStarted {
                run_id: ctx.run_id,
                phase: phase.name.clone(),
                parallel: phase.parallel,
            })
            .await;

        let aborted = if phase.parallel {
            run_parallel_phase(engine, ctx, phase_index, phase, content_hash, &mut totals).await?
        } else {
            run_sequential_phase(
                engine,
                ctx,
                phase_index,
                phase,
                skip_through,
                content_hash,
                &mut totals,
            )
            .await?
        };
        if aborted {
            totals.aborted = true;
            return Ok(totals);
        }

        engine
            .observer
            .notify(&Event::PhaseFinished {
                run_id: ctx.run_id,
                phase: phase.name.clone(),
            })
            .await;
    }

    Ok(totals)
}

async fn run_sequential_phase(
    engine: &Engine,
    ctx: &Arc<RunContext>,
    phase_index: usize,
    phase: &PhaseSpec,
    skip_through: i32,
    content_hash: &str,
    totals: &mut PhaseTotals,
) -> Result<bool, EngineError> {
    for (step_index, spec) in phase.steps.iter().enumerate() {
        if (step_index as i32) <= skip_through {
            continue;
        }
        totals.steps_run += 1;

        let status = run_step(step_task(engine, ctx, phase, spec)).await;
        match status {
            StepStatus::Completed => {
                commit(engine, ctx, content_hash, phase_index as i32, step_index as i32).await?;
            }
            StepStatus::Failed(_) => {
                ctx.cancel.cancel();
                // Record the last committed position; the failed step reruns
                // on resume.
                commit(
                    engine,
                    ctx,
                    content_hash,
                    phase_index as i32,
                    step_index as i32 - 1,
                )
                .await?;
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn run_parallel_phase(
    engine: &Engine,
    ctx: &Arc<RunContext>,
    phase_index: usize,
    phase: &PhaseSpec,
    content_hash: &str,
    totals: &mut PhaseTotals,
) -> Result<bool, EngineError> {
    let mut set: JoinSet<StepStatus> = JoinSet::new();
    for spec in &phase.steps {
        totals.steps_run += 1;
        let task = step_task(engine, ctx, phase, spec);
        set.spawn(run_step(task));
    }

    let mut failed = false;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(StepStatus::Completed) => {}
            Ok(StepStatus::Failed(_)) => {
                failed = true;
                break;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                set.abort_all();
                return Err(EngineError::Join(e.to_string()));
            }
        }
    }

    if failed {
        ctx.cancel.cancel();
        drain_with_grace(&mut set, engine.config.shutdown_grace).await;
        // Nothing in this phase is committed; resume reruns it whole.
        commit(engine, ctx, content_hash, phase_index as i32, -1).await?;
        return Ok(true);
    }

    commit(
        engine,
        ctx,
        content_hash,
        phase_index as i32,
        phase.steps.len() as i32 - 1,
    )
    .await?;
    Ok(false)
}

fn step_task(
    engine: &Engine,
    ctx: &Arc<RunContext>,
    phase: &PhaseSpec,
    spec: &waymark_core::StepSpec,
) -> StepTask {
    StepTask {
        ctx: ctx.clone(),
        http: engine.http.clone(),
        observer: engine.observer.clone(),
        phase: phase.name.clone(),
        spec: spec.clone(),
        grace: engine.config.shutdown_grace,
    }
}

async fn commit(
    engine: &Engine,
    ctx: &Arc<RunContext>,
    content_hash: &str,
    phase: i32,
    step: i32,
) -> Result<(), EngineError> {
    let checkpoint = Checkpoint {
        phase_index: phase,
        step_index: step,
        variables: ctx.vars.snapshot(),
        content_hash: content_hash.to_string(),
        saved_at: Utc::now(),
    };
    engine.checkpoints.save(&checkpoint).await?;
    engine
        .observer
        .notify(&Event::CheckpointSaved {
            run_id: ctx.run_id,
            phase,
            step,
        })
        .await;
    Ok(())
}

/// Give outstanding tasks `grace` to notice cancellation and finish, then
/// abort whatever is still running. Results are discarded; by the time this
/// runs the outcome of the batch is already decided.
pub(crate) async fn drain_with_grace<T: 'static>(set: &mut JoinSet<T>, grace: Duration) {
    let drained = tokio::time::timeout(grace, async {
        while set.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        set.abort_all();
        while set.join_next().await.is_some() {}
    }
}
