//! Shared fixtures for integration tests
//!
//! `FaultyStore` wraps any `StoreClient` and injects delays, failures and
//! catalog corruption per table or per statement.
#![allow(dead_code)]

use async_trait::async_trait;
use fanstore::{
    Column, DataType, DbError, MemoryStore, Result, RowSet, Schema, StoreClient, TableName, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Installs a fmt subscriber that writes through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fanstore=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn student_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer).primary_key(),
        Column::new("name", DataType::Text).not_null(),
    ])
}

/// `students` (2 rows), `jobs` (0 rows) and `interviews` (5 rows) in schema `app`.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new("app");
    for (table, count) in [("students", 2), ("jobs", 0), ("interviews", 5)] {
        store.create_table(table, student_schema()).await.unwrap();
        let rows = (1..=count)
            .map(|i| vec![Value::Integer(i), Value::from(format!("{} {}", table, i))])
            .collect();
        store.insert_rows(table, rows).await.unwrap();
    }
    store
}

#[derive(Default)]
pub struct Faults {
    pub read_delays: HashMap<String, Duration>,
    pub read_failures: HashMap<String, DbError>,
    pub extra_tables: Vec<String>,
    /// Statements containing the key fail with the error.
    pub execute_failures: Vec<(String, DbError)>,
    pub execute_delay: Option<Duration>,
    /// Statements containing the key sleep this long before running.
    pub statement_delays: Vec<(String, Duration)>,
    pub commit_failure: Option<DbError>,
    pub rollback_failure: Option<DbError>,
}

pub struct FaultyStore<S> {
    inner: S,
    faults: Faults,
    reads_started: AtomicUsize,
    reads_finished: AtomicUsize,
    executes: AtomicUsize,
    executes_finished: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl<S: StoreClient> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Faults::default(),
            reads_started: AtomicUsize::new(0),
            reads_finished: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            executes_finished: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }

    pub fn delay_read(mut self, table: &str, delay: Duration) -> Self {
        self.faults.read_delays.insert(table.to_string(), delay);
        self
    }

    pub fn fail_read(mut self, table: &str, err: DbError) -> Self {
        self.faults.read_failures.insert(table.to_string(), err);
        self
    }

    pub fn extra_table(mut self, raw: &str) -> Self {
        self.faults.extra_tables.push(raw.to_string());
        self
    }

    pub fn fail_execute(mut self, statement_fragment: &str, err: DbError) -> Self {
        self.faults
            .execute_failures
            .push((statement_fragment.to_string(), err));
        self
    }

    pub fn delay_execute(mut self, delay: Duration) -> Self {
        self.faults.execute_delay = Some(delay);
        self
    }

    pub fn delay_statement(mut self, statement_fragment: &str, delay: Duration) -> Self {
        self.faults
            .statement_delays
            .push((statement_fragment.to_string(), delay));
        self
    }

    pub fn fail_commit(mut self, err: DbError) -> Self {
        self.faults.commit_failure = Some(err);
        self
    }

    pub fn fail_rollback(mut self, err: DbError) -> Self {
        self.faults.rollback_failure = Some(err);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn reads_started(&self) -> usize {
        self.reads_started.load(Ordering::SeqCst)
    }

    pub fn reads_finished(&self) -> usize {
        self.reads_finished.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn executes_finished(&self) -> usize {
        self.executes_finished.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for FaultyStore<S> {
    type Transaction = S::Transaction;

    async fn query_tables(&self, schema: &str) -> Result<Vec<String>> {
        let mut names = self.inner.query_tables(schema).await?;
        names.extend(self.faults.extra_tables.iter().cloned());
        Ok(names)
    }

    async fn query_all(&self, table: &TableName) -> Result<RowSet> {
        self.reads_started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.faults.read_delays.get(table.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        let outcome = match self.faults.read_failures.get(table.as_str()) {
            Some(err) => Err(err.clone()),
            None => self.inner.query_all(table).await,
        };
        self.reads_finished.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction> {
        self.inner.begin_transaction().await
    }

    async fn execute(
        &self,
        txn: &Self::Transaction,
        statement: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        // Every call costs at least one round trip to the server.
        tokio::task::yield_now().await;
        if let Some(delay) = self.faults.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, delay)) = self
            .faults
            .statement_delays
            .iter()
            .find(|(fragment, _)| statement.contains(fragment.as_str()))
        {
            tokio::time::sleep(*delay).await;
        }
        let outcome = match self
            .faults
            .execute_failures
            .iter()
            .find(|(fragment, _)| statement.contains(fragment.as_str()))
        {
            Some((_, err)) => Err(err.clone()),
            None => self.inner.execute(txn, statement, params).await,
        };
        self.executes_finished.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn commit(&self, txn: &mut Self::Transaction) -> Result<()> {
        if let Some(err) = &self.faults.commit_failure {
            return Err(err.clone());
        }
        self.inner.commit(txn).await
    }

    async fn rollback(&self, txn: Self::Transaction) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        let outcome = self.inner.rollback(txn).await;
        match &self.faults.rollback_failure {
            Some(err) => Err(err.clone()),
            None => outcome,
        }
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
