mod rules;

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ValidationError, Violation};
use crate::types::Playbook;

pub(crate) static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid regex"));
pub(crate) static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("valid regex"));

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for Playbook {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_playbook(self)
    }
}

/// Check the whole playbook, collecting every violation instead of stopping
/// at the first.
pub fn validate_playbook(playbook: &Playbook) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    rules::validate_playbook(&mut v, playbook);
    v.finish()
}

pub(crate) struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }

    pub(crate) fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }
}
