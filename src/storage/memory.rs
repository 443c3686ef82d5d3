use super::Catalog;
use super::statement::Mutation;
use crate::core::{DbError, Result, Row, Schema, Value};
use crate::result::RowSet;
use crate::store::{StoreClient, TableName};
use crate::transaction::handle::WorkingSet;
use crate::transaction::{
    MemoryTransaction, TransactionCounters, TransactionId, TransactionState, TransactionStats,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{Level, event};

/// In-process relational store for one schema.
///
/// Reads see committed data only. Transactions write to a private
/// copy-on-write catalog; commit publishes the touched tables unless another
/// transaction published one of them first, in which case the commit fails
/// with [`DbError::WriteConflict`].
pub struct MemoryStore {
    schema: String,
    committed: RwLock<Catalog>,
    counters: Arc<TransactionCounters>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            committed: RwLock::new(Catalog::new()),
            counters: Arc::new(TransactionCounters::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Registers a table. Schema changes are not transactional.
    pub async fn create_table(&self, name: &str, schema: Schema) -> Result<()> {
        self.ensure_available()?;
        let mut catalog = self.committed.write().await;
        catalog.create_table(name, schema)?;
        event!(Level::DEBUG, table = name, "table created");
        Ok(())
    }

    /// Seeds rows outside of any transaction.
    pub async fn insert_rows(&self, name: &str, rows: Vec<Row>) -> Result<u64> {
        self.ensure_available()?;
        let mut catalog = self.committed.write().await;
        let mut table = catalog.get_table(name)?.clone();
        let inserted = table.insert(rows)?;
        catalog.publish(table);
        Ok(inserted)
    }

    /// Committed rows of `name`.
    pub async fn rows(&self, name: &str) -> Result<RowSet> {
        self.ensure_available()?;
        let catalog = self.committed.read().await;
        Ok(catalog.get_table(name)?.to_row_set())
    }

    /// Simulates the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.counters.stats()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::ConnectionError(format!(
                "store for schema '{}' is unreachable",
                self.schema
            )))
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn query_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        if schema != self.schema {
            return Ok(Vec::new());
        }
        Ok(self.committed.read().await.list_tables())
    }

    async fn query_all(&self, table: &TableName) -> Result<RowSet> {
        self.ensure_available()?;
        let catalog = self.committed.read().await;
        Ok(catalog.get_table(table.as_str())?.to_row_set())
    }

    async fn begin_transaction(&self) -> Result<MemoryTransaction> {
        self.ensure_available()?;
        let snapshot = self.committed.read().await.clone();
        let txn = MemoryTransaction::begin(snapshot, Arc::clone(&self.counters));
        event!(Level::DEBUG, txn = %txn.id(), "transaction started");
        Ok(txn)
    }

    async fn execute(
        &self,
        txn: &MemoryTransaction,
        statement: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.ensure_available()?;
        let mutation = Mutation::compile(statement, params)?;
        txn.execute(&mutation).await
    }

    async fn commit(&self, txn: &mut MemoryTransaction) -> Result<()> {
        if let Err(err) = self.ensure_available() {
            txn.settle(TransactionState::Aborted);
            return Err(err);
        }

        let working = txn.take_changes();
        if let Err(err) = working.state.ensure_active(txn.id()) {
            txn.settle(TransactionState::Aborted);
            return Err(err);
        }

        let mut catalog = self.committed.write().await;
        if let Err(err) = publish(&mut catalog, &working, txn.id()) {
            drop(catalog);
            txn.settle(TransactionState::Aborted);
            return Err(err);
        }
        drop(catalog);

        txn.settle(TransactionState::Committed);
        event!(
            Level::DEBUG,
            txn = %txn.id(),
            statements = working.statements,
            tables = working.touched.len(),
            "transaction committed"
        );
        Ok(())
    }

    async fn rollback(&self, mut txn: MemoryTransaction) -> Result<()> {
        // Discarding the working set is local, so this succeeds even when
        // the store is unreachable; the caller still hears about the outage.
        let _ = txn.take_changes();
        txn.settle(TransactionState::Aborted);
        event!(Level::DEBUG, txn = %txn.id(), "transaction rolled back");
        self.ensure_available()
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_available()
    }
}

/// Publishes every touched table, or nothing if any of them moved on since
/// the transaction first touched it.
fn publish(catalog: &mut Catalog, working: &WorkingSet, txn: TransactionId) -> Result<()> {
    for name in &working.touched {
        let current = catalog.get_table(name).map(|t| t.version()).ok();
        if current != working.base_versions.get(name).copied() {
            return Err(DbError::WriteConflict(format!(
                "table '{}' changed since {} started",
                name, txn
            )));
        }
    }

    let tables = working
        .touched
        .iter()
        .map(|name| working.catalog.get_table(name).cloned())
        .collect::<Result<Vec<_>>>()?;
    for table in tables {
        catalog.publish(table);
    }
    Ok(())
}
