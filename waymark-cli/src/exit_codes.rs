//! Stable exit codes so scripts can tell a bad playbook (2) from a run that
//! failed (3) from broken machinery like an unreachable checkpoint store (4).

pub const SUCCESS: i32 = 0;
pub const VALIDATION_FAILED: i32 = 2;
pub const RUN_FAILED: i32 = 3;
pub const RUNTIME_ERROR: i32 = 4;
