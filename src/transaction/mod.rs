// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Store-side transactions for `MemoryStore`: each transaction works on a
// copy-on-write clone of the committed catalog and publishes the tables it
// touched on commit, provided nobody published them first.
//
// ============================================================================

pub mod handle;
pub mod state;

pub use handle::{MemoryTransaction, TransactionCounters, TransactionStats};
pub use state::{TransactionId, TransactionState};
