mod store;

pub use store::PostgresCheckpointStore;
