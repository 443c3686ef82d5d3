use super::barrier::CompletionBarrier;
use super::state::BatchState;
use crate::config::{CoordinatorConfig, DispatchMode};
use crate::core::{DbError, Result, Value};
use crate::store::StoreClient;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// One parameterized write of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// Caller-side label used in errors and reports; defaults to `#<position>`.
    #[serde(default)]
    pub id: Option<String>,
    pub statement: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Fail with [`DbError::NotFound`] when the write affects no rows.
    #[serde(default)]
    pub expect_match: bool,
}

impl BatchOperation {
    pub fn new(statement: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: None,
            statement: statement.into(),
            params,
            expect_match: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Requires the write to match at least one row.
    pub fn expect_match(mut self) -> Self {
        self.expect_match = true;
        self
    }

    pub fn label(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("#{}", index + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub id: String,
    pub affected_rows: u64,
}

/// Result of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub operations: usize,
    pub affected_rows: u64,
    /// In submission order.
    pub per_operation: Vec<OperationOutcome>,
}

/// Applies a list of writes as one all-or-nothing transaction.
pub struct BatchMutator<S> {
    store: Arc<S>,
    mode: DispatchMode,
}

impl<S> Clone for BatchMutator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mode: self.mode,
        }
    }
}

impl<S: StoreClient> BatchMutator<S> {
    pub fn new(store: Arc<S>, config: &CoordinatorConfig) -> Self {
        Self {
            store,
            mode: config.dispatch_mode,
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Runs every operation inside a single transaction.
    ///
    /// Commits only when all of them succeed. Otherwise the transaction is
    /// rolled back before the first failure is returned; a failed rollback
    /// is logged and never replaces that failure.
    pub async fn apply_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchReport> {
        let batch_id = Uuid::new_v4();
        let span = info_span!(
            "batch",
            batch_id = %batch_id,
            operations = operations.len(),
            mode = %self.mode
        );
        self.run(batch_id, operations).instrument(span).await
    }

    async fn run(&self, batch_id: Uuid, operations: Vec<BatchOperation>) -> Result<BatchReport> {
        validate_operations(&operations)?;

        let mut state = BatchState::Idle;
        let mut txn = self.store.begin_transaction().await?;
        state.transition_to(BatchState::Active)?;
        event!(Level::DEBUG, "batch transaction opened");

        let (barrier, settled) = CompletionBarrier::<u64>::channel(operations.len());
        match self.mode {
            DispatchMode::Concurrent => {
                join_all(
                    operations
                        .iter()
                        .enumerate()
                        .map(|(index, op)| self.dispatch(&txn, index, op, &barrier)),
                )
                .await;
            }
            DispatchMode::Sequential => {
                for (index, op) in operations.iter().enumerate() {
                    if barrier.is_settled() {
                        break;
                    }
                    self.dispatch(&txn, index, op, &barrier).await;
                }
            }
        }
        drop(barrier);

        let affected = match settled.wait().await {
            Ok(affected) => affected,
            Err(err) => {
                state.transition_to(BatchState::Failed)?;
                self.roll_back(&mut state, txn, &err).await;
                return Err(err);
            }
        };

        state.transition_to(BatchState::Committing)?;
        if let Err(err) = self.store.commit(&mut txn).await {
            let err = DbError::CommitFailed(err.to_string());
            state.transition_to(BatchState::RollingBack)?;
            self.roll_back(&mut state, txn, &err).await;
            return Err(err);
        }
        state.transition_to(BatchState::Committed)?;

        let per_operation: Vec<OperationOutcome> = operations
            .iter()
            .zip(affected)
            .enumerate()
            .map(|(index, (op, affected_rows))| OperationOutcome {
                id: op.label(index),
                affected_rows,
            })
            .collect();
        let report = BatchReport {
            batch_id,
            operations: per_operation.len(),
            affected_rows: per_operation.iter().map(|o| o.affected_rows).sum(),
            per_operation,
        };

        event!(
            Level::INFO,
            affected_rows = report.affected_rows,
            state = %state,
            "batch committed"
        );
        Ok(report)
    }

    async fn dispatch(
        &self,
        txn: &S::Transaction,
        index: usize,
        op: &BatchOperation,
        barrier: &CompletionBarrier<u64>,
    ) {
        if barrier.is_settled() {
            event!(Level::DEBUG, operation = %op.label(index), "skipping operation of failed batch");
            return;
        }

        let recorded = match self.execute(txn, index, op).await {
            Ok(affected) => barrier.record_success(index, affected),
            Err(err) => barrier.record_failure(err),
        };
        if let Err(err) = recorded {
            event!(Level::ERROR, error = %err, "failed to record batch operation");
        }
    }

    async fn execute(&self, txn: &S::Transaction, index: usize, op: &BatchOperation) -> Result<u64> {
        let label = op.label(index);
        let affected = self
            .store
            .execute(txn, &op.statement, &op.params)
            .await
            .map_err(|err| err.into_operation_failure(format!("operation {}", label)))?;

        if op.expect_match && affected == 0 {
            return Err(DbError::NotFound(format!(
                "operation {} matched no rows",
                label
            )));
        }
        event!(Level::DEBUG, operation = %label, affected, "batch operation applied");
        Ok(affected)
    }

    async fn roll_back(&self, state: &mut BatchState, txn: S::Transaction, cause: &DbError) {
        if *state == BatchState::Failed && state.transition_to(BatchState::RollingBack).is_err() {
            return;
        }

        match self.store.rollback(txn).await {
            Ok(()) => {
                let _ = state.transition_to(BatchState::RolledBack);
                event!(Level::WARN, error = %cause, state = %state, "batch rolled back");
            }
            Err(err) => {
                let err = DbError::RollbackFailed(err.to_string());
                event!(Level::ERROR, error = %err, cause = %cause, "batch rollback failed");
            }
        }
    }
}

fn validate_operations(operations: &[BatchOperation]) -> Result<()> {
    if operations.is_empty() {
        return Err(DbError::InvalidInput(
            "batch contains no operations".to_string(),
        ));
    }

    if let Some((index, op)) = operations
        .iter()
        .enumerate()
        .find(|(_, op)| op.statement.trim().is_empty())
    {
        return Err(DbError::InvalidInput(format!(
            "operation {} has an empty statement",
            op.label(index)
        )));
    }

    Ok(())
}
