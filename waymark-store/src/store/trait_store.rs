use async_trait::async_trait;

use crate::store::Checkpoint;

/// Durable checkpoint storage, keyed by run.
///
/// Backends must make `save` atomic: a crash mid-save may lose the new
/// snapshot but never corrupt the previous one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// The last saved snapshot, or `None` when the key has never been saved
    /// (or was cleared).
    async fn load(&self, key: &str) -> Result<Option<Checkpoint>, StoreError>;

    async fn clear(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
    #[error("store error: {0}")]
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Other(e.to_string())
    }
}

/// Discards saves; used when checkpointing is disabled.
pub struct NoopCheckpointStore;

#[async_trait]
impl CheckpointStore for NoopCheckpointStore {
    async fn save(&self, _key: &str, _checkpoint: &Checkpoint) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load(&self, _key: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(None)
    }

    async fn clear(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
