mod trait_store;
mod types;

pub use trait_store::{CheckpointStore, NoopCheckpointStore, StoreError};
pub use types::Checkpoint;
