#![forbid(unsafe_code)]

//! Durable checkpoints for playbook runs.
//!
//! A [`Checkpoint`] records the last committed execution position plus a
//! snapshot of the variable store; [`CheckpointStore`] is the persistence
//! seam with file and Postgres backends behind it.

pub mod factory;
pub mod file;
pub mod postgres;
pub mod store;

pub use crate::factory::{make_store, StoreSpec};
pub use crate::file::FileCheckpointStore;
pub use crate::postgres::PostgresCheckpointStore;
pub use crate::store::{Checkpoint, CheckpointStore, NoopCheckpointStore, StoreError};
