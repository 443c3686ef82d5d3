// ============================================================================
// fanstore Library
// ============================================================================
//
// Concurrent read fan-out and transactional write batches over a relational
// store reached through the `StoreClient` trait.
//
// ============================================================================

pub mod config;
pub mod coordination;
pub mod core;
pub mod result;
pub mod storage;
pub mod store;
pub mod transaction;

// Re-export main types for convenience
pub use config::{CoordinatorConfig, DispatchMode};
pub use coordination::{
    BatchMutator, BatchOperation, BatchReport, BatchState, CompletionBarrier, OperationOutcome,
    SnapshotAggregator,
};
pub use core::{Column, DataType, DbError, Result, Row, Schema, Value};
pub use result::{RowSet, SnapshotResult};
pub use storage::MemoryStore;
pub use store::{StoreClient, TableName, TimedStore};

use std::sync::Arc;
use std::time::Duration;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// High-level Client API
// ============================================================================

/// Entry point for request handlers
///
/// Bundles a store with its coordination settings. Cheap to clone; clones
/// share the store.
///
/// # Examples
///
/// ```
/// use fanstore::{BatchOperation, Client, Column, CoordinatorConfig, DataType, MemoryStore, Schema, Value};
///
/// # #[tokio::main]
/// # async fn main() -> fanstore::Result<()> {
/// let store = MemoryStore::new("app");
/// store
///     .create_table("students", Schema::new(vec![
///         Column::new("id", DataType::Integer).primary_key(),
///         Column::new("name", DataType::Text).not_null(),
///     ]))
///     .await?;
///
/// let client = Client::new(store, CoordinatorConfig::new("app"))?;
/// client
///     .apply_batch(vec![BatchOperation::new(
///         "INSERT INTO students (id, name) VALUES (?, ?)",
///         vec![Value::Integer(1), Value::from("Ada")],
///     )])
///     .await?;
///
/// let snapshot = client.snapshot().await?;
/// assert_eq!(snapshot.get("students").unwrap().row_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Client<S> {
    store: Arc<S>,
    config: CoordinatorConfig,
    snapshots: SnapshotAggregator<S>,
    batches: BatchMutator<S>,
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            snapshots: self.snapshots.clone(),
            batches: self.batches.clone(),
        }
    }
}

impl<S: StoreClient + 'static> Client<S> {
    /// Fails with [`DbError::InvalidInput`] when `config` does not validate.
    pub fn new(store: S, config: CoordinatorConfig) -> Result<Self> {
        Self::from_shared(Arc::new(store), config)
    }

    /// Like [`Client::new`], for a store that is already shared.
    pub fn from_shared(store: Arc<S>, config: CoordinatorConfig) -> Result<Self> {
        config.validate().map_err(DbError::InvalidInput)?;

        Ok(Self {
            snapshots: SnapshotAggregator::new(Arc::clone(&store), &config),
            batches: BatchMutator::new(Arc::clone(&store), &config),
            store,
            config,
        })
    }

    /// Snapshot of the configured schema
    pub async fn snapshot(&self) -> Result<SnapshotResult> {
        self.snapshots.snapshot(&self.config.schema).await
    }

    /// Snapshot of an explicitly named schema
    pub async fn snapshot_schema(&self, schema: &str) -> Result<SnapshotResult> {
        self.snapshots.snapshot(schema).await
    }

    /// Applies `operations` as one transaction
    pub async fn apply_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchReport> {
        self.batches.apply_batch(operations).await
    }

    /// Checks that the store is reachable
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl<S: StoreClient + 'static> Client<TimedStore<S>> {
    /// Wraps `store` so that every call honours the configured query
    /// timeout (30s when none is set).
    pub fn with_query_timeout(store: S, config: CoordinatorConfig) -> Result<Self> {
        let limit = config
            .query_timeout_duration()
            .unwrap_or(DEFAULT_QUERY_TIMEOUT);
        Self::new(TimedStore::new(store, limit), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CoordinatorConfig::new("app").max_in_flight(0);
        let err = Client::new(MemoryStore::new("app"), config).err().unwrap();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_snapshot_of_configured_schema() {
        let store = MemoryStore::new("app");
        store
            .create_table(
                "jobs",
                Schema::new(vec![Column::new("id", DataType::Integer)]),
            )
            .await
            .unwrap();
        let client = Client::new(store, CoordinatorConfig::new("app")).unwrap();

        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.table_names(), vec!["jobs"]);
        assert!(matches!(
            client.snapshot_schema("other").await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timed_client_uses_configured_limit() {
        let config = CoordinatorConfig::new("app").query_timeout(Duration::from_millis(50));
        let client = Client::with_query_timeout(MemoryStore::new("app"), config).unwrap();

        assert_eq!(client.store().limit(), Duration::from_millis(50));
        client.ping().await.unwrap();
    }
}
