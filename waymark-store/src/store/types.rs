use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Last committed execution position of a run, plus everything needed to
/// pick it up again.
///
/// `step_index` is the index of the last step that fully resolved within
/// `phase_index`; `-1` means the phase was entered but no step has committed
/// yet, so resume starts the phase from its first step. `content_hash` ties
/// the snapshot to the exact playbook it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase_index: i32,
    pub step_index: i32,
    pub variables: BTreeMap<String, JsonValue>,
    pub content_hash: String,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot positioned before the first step of the first phase.
    pub fn initial(content_hash: impl Into<String>) -> Self {
        Self {
            phase_index: 0,
            step_index: -1,
            variables: BTreeMap::new(),
            content_hash: content_hash.into(),
            saved_at: Utc::now(),
        }
    }
}
