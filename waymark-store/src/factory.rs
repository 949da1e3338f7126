//! String-tagged backend selection, so callers can wire a store from a CLI
//! flag or config value without naming concrete types.

use std::str::FromStr;
use std::sync::Arc;

use crate::file::FileCheckpointStore;
use crate::postgres::PostgresCheckpointStore;
use crate::store::{CheckpointStore, NoopCheckpointStore, StoreError};

/// Parsed form of a store spec string: `file:<dir>`, `postgres:<url>`, or
/// `none`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    File(String),
    Postgres(String),
    None,
}

impl FromStr for StoreSpec {
    type Err = StoreError;

    fn from_str(spec: &str) -> Result<Self, StoreError> {
        if spec == "none" {
            return Ok(StoreSpec::None);
        }
        match spec.split_once(':') {
            Some(("file", dir)) if !dir.is_empty() => Ok(StoreSpec::File(dir.to_string())),
            Some(("postgres", url)) if !url.is_empty() => {
                // `postgres:…` may itself be a postgres:// URL; keep the
                // original string for the connector.
                Ok(StoreSpec::Postgres(spec.to_string()))
            }
            _ => Err(StoreError::Other(format!(
                "unknown checkpoint store '{spec}' (expected file:<dir>, postgres:<url>, or none)"
            ))),
        }
    }
}

/// Build a store from its spec string. Postgres connects (and creates its
/// schema) eagerly so a bad URL fails before the run starts.
pub async fn make_store(spec: &str) -> Result<Arc<dyn CheckpointStore>, StoreError> {
    match spec.parse::<StoreSpec>()? {
        StoreSpec::File(dir) => Ok(Arc::new(FileCheckpointStore::new(dir))),
        StoreSpec::Postgres(url) => {
            let store = PostgresCheckpointStore::connect(&url, 5).await?;
            Ok(Arc::new(store))
        }
        StoreSpec::None => Ok(Arc::new(NoopCheckpointStore)),
    }
}
