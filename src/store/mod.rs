// ============================================================================
// Store Client contract
// ============================================================================
//
// The coordination layer talks to the relational backend only through
// `StoreClient`. `MemoryStore` implements it in-process; a driver-backed
// client (MySQL, Postgres) implements the same trait in the host service.
//
// ============================================================================

pub mod table_name;
pub mod timeout;

pub use table_name::TableName;
pub use timeout::TimedStore;

use crate::core::{Result, Value};
use crate::result::RowSet;
use async_trait::async_trait;

/// Async facade over a relational store.
///
/// Every failure is reported as a typed [`crate::DbError`], never as a raw
/// driver error.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Exclusively-owned handle to one open transaction.
    ///
    /// `rollback` takes it by value. `commit` borrows it so that a caller
    /// whose commit failed can still roll back; a committed handle is
    /// simply dropped.
    type Transaction: Send + Sync;

    /// Lists the raw table names the catalog reports for `schema`.
    ///
    /// Names are returned unvalidated; callers turn them into
    /// [`TableName`]s and treat malformed entries as catalog corruption.
    async fn query_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Reads every row of `table`.
    ///
    /// The table is addressed through the driver's identifier binding
    /// (`??` in MySQL drivers), never spliced into statement text.
    async fn query_all(&self, table: &TableName) -> Result<RowSet>;

    async fn begin_transaction(&self) -> Result<Self::Transaction>;

    /// Runs one parameterized write inside `txn` and returns the number of
    /// affected rows.
    async fn execute(
        &self,
        txn: &Self::Transaction,
        statement: &str,
        params: &[Value],
    ) -> Result<u64>;

    /// Publishes the writes of `txn`.
    ///
    /// On success the handle is spent and further calls with it fail. On
    /// failure nothing was published.
    async fn commit(&self, txn: &mut Self::Transaction) -> Result<()>;

    async fn rollback(&self, txn: Self::Transaction) -> Result<()>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
