// ============================================================================
// Coordination Module
// ============================================================================
//
// Fan-out/fan-in over a `StoreClient`:
// - `SnapshotAggregator` reads every table of a schema concurrently
// - `BatchMutator` applies N writes inside one transaction
// Both settle through a `CompletionBarrier`, so each call produces exactly
// one success or one error.
//
// ============================================================================

pub mod barrier;
pub mod batch;
pub mod snapshot;
pub mod state;

pub use barrier::{CompletionBarrier, Settled, Settlement};
pub use batch::{BatchMutator, BatchOperation, BatchReport, OperationOutcome};
pub use snapshot::SnapshotAggregator;
pub use state::BatchState;
