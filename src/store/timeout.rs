use super::{StoreClient, TableName};
use crate::core::{DbError, Result, Value};
use crate::result::RowSet;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Applies a per-call deadline to every store call.
///
/// An expired deadline is reported as [`DbError::OperationFailed`], the same
/// as any other failed read or write.
pub struct TimedStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: StoreClient> TimedStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        operation: impl FnOnce() -> String,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(self.limit, fut).await.map_err(|_| DbError::OperationFailed {
            operation: operation(),
            reason: format!("timed out after {}ms", self.limit.as_millis()),
        })?
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for TimedStore<S> {
    type Transaction = S::Transaction;

    async fn query_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.bounded(
            || format!("list tables of {}", schema),
            self.inner.query_tables(schema),
        )
        .await
    }

    async fn query_all(&self, table: &TableName) -> Result<RowSet> {
        self.bounded(|| format!("read {}", table), self.inner.query_all(table))
            .await
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction> {
        self.bounded(|| "begin".to_string(), self.inner.begin_transaction())
            .await
    }

    async fn execute(
        &self,
        txn: &Self::Transaction,
        statement: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.bounded(
            || format!("execute {}", statement.trim()),
            self.inner.execute(txn, statement, params),
        )
        .await
    }

    async fn commit(&self, txn: &mut Self::Transaction) -> Result<()> {
        self.bounded(|| "commit".to_string(), self.inner.commit(txn))
            .await
    }

    async fn rollback(&self, txn: Self::Transaction) -> Result<()> {
        self.bounded(|| "rollback".to_string(), self.inner.rollback(txn))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(|| "ping".to_string(), self.inner.ping()).await
    }
}
