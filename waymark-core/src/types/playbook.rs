use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::types::{SessionSpec, StepSpec};

/// Root of a playbook document: named sessions plus an ordered list of phases.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Playbook {
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionSpec>,

    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
}

impl Playbook {
    /// Lowercase hex SHA-256 of the canonical JSON form.
    ///
    /// Checkpoints record this so a resume against an edited playbook is
    /// detected instead of replayed against the wrong step list.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSpec {
    pub name: String,

    /// Run this phase's steps concurrently instead of in declaration order.
    #[serde(default)]
    pub parallel: bool,

    pub steps: Vec<StepSpec>,
}
