pub mod row_set;
pub mod snapshot;

pub use row_set::RowSet;
pub use snapshot::SnapshotResult;
