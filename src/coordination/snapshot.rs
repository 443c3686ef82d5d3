use super::barrier::CompletionBarrier;
use crate::config::CoordinatorConfig;
use crate::core::{DbError, Result};
use crate::result::{RowSet, SnapshotResult};
use crate::store::{StoreClient, TableName};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, Level, event, info_span};

/// Reads every table of a schema concurrently and merges the results.
///
/// One task is spawned per table. The first failed read settles the whole
/// snapshot with that error; reads still in flight run to completion but
/// their results are discarded.
pub struct SnapshotAggregator<S> {
    store: Arc<S>,
    max_in_flight: usize,
}

impl<S> Clone for SnapshotAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_in_flight: self.max_in_flight,
        }
    }
}

impl<S: StoreClient + 'static> SnapshotAggregator<S> {
    pub fn new(store: Arc<S>, config: &CoordinatorConfig) -> Self {
        Self {
            store,
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Full contents of every table in `schema`, keyed by table name.
    ///
    /// Fails with [`DbError::NotFound`] when the schema has no tables and
    /// with [`DbError::CorruptCatalog`] when the catalog reports a name that
    /// is not a usable identifier or lists the same table twice. Otherwise either every table is present
    /// or exactly one error is returned.
    pub async fn snapshot(&self, schema: &str) -> Result<SnapshotResult> {
        let span = info_span!("snapshot", schema = %schema);
        self.collect(schema).instrument(span).await
    }

    async fn collect(&self, schema: &str) -> Result<SnapshotResult> {
        let raw_names = self.store.query_tables(schema).await?;
        if raw_names.is_empty() {
            return Err(DbError::NotFound(format!("no tables in schema '{}'", schema)));
        }

        let tables = raw_names
            .into_iter()
            .map(TableName::from_catalog)
            .collect::<Result<Vec<_>>>()?;

        reject_duplicates(&tables)?;

        event!(Level::DEBUG, tables = tables.len(), "dispatching table reads");

        let (barrier, settled) = CompletionBarrier::<(TableName, RowSet)>::channel(tables.len());
        let barrier = Arc::new(barrier);
        let inflight = Arc::new(Semaphore::new(self.max_in_flight));

        for (slot, table) in tables.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let barrier = Arc::clone(&barrier);
            let inflight = Arc::clone(&inflight);

            tokio::spawn(
                async move {
                    let outcome = read_table(store.as_ref(), &table, inflight, &barrier).await;
                    let recorded = match outcome {
                        Some(Ok(rows)) => barrier.record_success(slot, (table, rows)),
                        Some(Err(err)) => {
                            let operation = format!("read {}", table);
                            barrier.record_failure(err.into_operation_failure(operation))
                        }
                        None => return,
                    };
                    if let Err(err) = recorded {
                        event!(Level::ERROR, error = %err, "failed to record table read");
                    }
                }
                .in_current_span(),
            );
        }
        // Only the spawned reads hold the barrier from here on; if all of them
        // exit without recording, `wait` fails instead of hanging.
        drop(barrier);

        let entries = settled.wait().await?;
        event!(Level::DEBUG, tables = entries.len(), "snapshot settled");
        Ok(SnapshotResult::new(entries.into_iter().collect()))
    }
}

fn reject_duplicates(tables: &[TableName]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for table in tables {
        if !seen.insert(table.as_str()) {
            return Err(DbError::CorruptCatalog(format!(
                "catalog listed table '{}' twice",
                table
            )));
        }
    }
    Ok(())
}

/// Returns `None` when the snapshot settled before this read got a slot.
async fn read_table<S: StoreClient>(
    store: &S,
    table: &TableName,
    inflight: Arc<Semaphore>,
    barrier: &CompletionBarrier<(TableName, RowSet)>,
) -> Option<Result<RowSet>> {
    let _permit = match acquire_read_permit(inflight).await {
        Ok(permit) => permit,
        Err(err) => return Some(Err(err)),
    };

    if barrier.is_settled() {
        event!(Level::DEBUG, table = %table, "skipping read of settled snapshot");
        return None;
    }

    Some(store.query_all(table).await)
}

/// Queued reads wait without a deadline; store call timeouts belong to the
/// store client.
async fn acquire_read_permit(inflight: Arc<Semaphore>) -> Result<OwnedSemaphorePermit> {
    inflight
        .acquire_owned()
        .await
        .map_err(|_| DbError::InvalidState("read slot semaphore closed".to_string()))
}
