//! Checkpoint plumbing for the engine: a keyed handle over a
//! [`CheckpointStore`] plus the resume-position rules.

use std::path::Path;
use std::sync::Arc;

use waymark_core::Playbook;
use waymark_store::{Checkpoint, CheckpointStore, StoreError};

use crate::engine::EngineError;

/// One playbook's slot in a checkpoint store. The key stays stable across
/// runs of the same playbook so resume finds the previous snapshot.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    key: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Keyed by the playbook's file stem, sanitized to `[A-Za-z0-9_-]`.
    pub fn for_playbook_path(store: Arc<dyn CheckpointStore>, path: &Path) -> Self {
        Self::new(store, checkpoint_key(path))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.store.save(&self.key, checkpoint).await
    }

    pub(crate) async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        self.store.load(&self.key).await
    }

    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear(&self.key).await
    }
}

/// Derive a store key from a playbook path: file stem with anything outside
/// `[A-Za-z0-9_-]` replaced by `_`.
pub fn checkpoint_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("playbook");
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "playbook".to_string()
    } else {
        sanitized
    }
}

/// Where a resumed run picks up: skip phases before `phase`, and within it
/// skip steps at or below `skip_through_step`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StartPosition {
    pub phase: usize,
    pub skip_through_step: i32,
}

impl Default for StartPosition {
    fn default() -> Self {
        Self {
            phase: 0,
            skip_through_step: -1,
        }
    }
}

/// Validate a loaded checkpoint against the current playbook and translate
/// it into a start position.
///
/// A checkpoint pointing into a parallel phase restarts that whole phase
/// (per-step order inside it carries no meaning), except when it marks the
/// phase fully complete, in which case every step is skipped.
pub(crate) fn resume_position(
    checkpoint: &Checkpoint,
    playbook: &Playbook,
    current_hash: &str,
) -> Result<StartPosition, EngineError> {
    if checkpoint.content_hash != current_hash {
        return Err(EngineError::CheckpointMismatch(
            "playbook changed since the checkpoint was written (content hash differs)".to_string(),
        ));
    }

    let phase_count = playbook.phases.len() as i32;
    if checkpoint.phase_index < 0 || checkpoint.phase_index >= phase_count {
        return Err(EngineError::CheckpointMismatch(format!(
            "checkpoint phase index {} is outside 0..{phase_count}",
            checkpoint.phase_index
        )));
    }
    let phase = &playbook.phases[checkpoint.phase_index as usize];
    let step_count = phase.steps.len() as i32;
    if checkpoint.step_index < -1 || checkpoint.step_index >= step_count {
        return Err(EngineError::CheckpointMismatch(format!(
            "checkpoint step index {} is outside -1..{step_count} for phase '{}'",
            checkpoint.step_index, phase.name
        )));
    }

    let skip_through_step = if phase.parallel {
        if checkpoint.step_index == step_count - 1 {
            checkpoint.step_index
        } else {
            -1
        }
    } else {
        checkpoint.step_index
    };

    Ok(StartPosition {
        phase: checkpoint.phase_index as usize,
        skip_through_step,
    })
}
