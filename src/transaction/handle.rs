use super::{TransactionId, TransactionState};
use crate::core::Result;
use crate::storage::Catalog;
use crate::storage::statement::Mutation;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{Level, event};

/// Transaction lifecycle counters shared by a store and its transactions.
#[derive(Debug, Default)]
pub struct TransactionCounters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    abandoned: AtomicU64,
    active: AtomicUsize,
}

impl TransactionCounters {
    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            abandoned: self.abandoned.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Dropped without commit or rollback.
    pub abandoned: u64,
    pub active: usize,
}

impl std::fmt::Display for TransactionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transactions: {} begun, {} committed, {} rolled back, {} abandoned, {} active",
            self.begun, self.committed, self.rolled_back, self.abandoned, self.active
        )
    }
}

/// Private working state of one transaction.
pub(crate) struct WorkingSet {
    pub(crate) catalog: Catalog,
    /// Committed version of every touched table when it was first touched.
    pub(crate) base_versions: HashMap<String, u64>,
    pub(crate) touched: BTreeSet<String>,
    pub(crate) statements: u64,
    pub(crate) state: TransactionState,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self {
            catalog: Catalog::new(),
            base_versions: HashMap::new(),
            touched: BTreeSet::new(),
            statements: 0,
            state: TransactionState::Aborted,
        }
    }
}

/// Open transaction on a [`crate::storage::MemoryStore`].
///
/// Writes land in a private copy of the catalog and become visible to
/// other readers only when the store commits it.
pub struct MemoryTransaction {
    id: TransactionId,
    working: Mutex<WorkingSet>,
    counters: Arc<TransactionCounters>,
    finished: bool,
}

impl MemoryTransaction {
    pub(crate) fn begin(catalog: Catalog, counters: Arc<TransactionCounters>) -> Self {
        counters.begun.fetch_add(1, Ordering::SeqCst);
        counters.active.fetch_add(1, Ordering::SeqCst);

        Self {
            id: TransactionId::new(),
            working: Mutex::new(WorkingSet {
                catalog,
                state: TransactionState::Active,
                ..WorkingSet::default()
            }),
            counters,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) async fn execute(&self, mutation: &Mutation) -> Result<u64> {
        let mut working = self.working.lock().await;
        working.state.ensure_active(self.id)?;

        let name = mutation.table().to_string();
        let table = working.catalog.get_table_mut(&name)?;
        let version = table.version();
        let affected = mutation.apply(table)?;

        working.base_versions.entry(name.clone()).or_insert(version);
        working.touched.insert(name);
        working.statements += 1;
        Ok(affected)
    }

    pub(crate) fn take_changes(&mut self) -> WorkingSet {
        std::mem::take(self.working.get_mut())
    }

    /// Records the final outcome. Later calls are no-ops.
    pub(crate) fn settle(&mut self, outcome: TransactionState) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.working.get_mut().state = outcome;
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            TransactionState::Committed => self.counters.committed.fetch_add(1, Ordering::SeqCst),
            _ => self.counters.rolled_back.fetch_add(1, Ordering::SeqCst),
        };
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        event!(Level::WARN, txn = %self.id, "transaction dropped without commit or rollback");
    }
}
