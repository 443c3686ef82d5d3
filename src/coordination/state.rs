use crate::core::{DbError, Result};
use std::fmt;

/// Lifecycle of one batch.
///
/// ```text
/// Idle -> Active -> Committing -> Committed
///                \-> Failed -> RollingBack -> RolledBack
/// ```
///
/// A failed commit also moves `Committing -> RollingBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    Active,
    Committing,
    Committed,
    Failed,
    RollingBack,
    RolledBack,
}

impl BatchState {
    pub fn can_transition_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Idle, Active)
                | (Active, Committing)
                | (Active, Failed)
                | (Committing, Committed)
                | (Committing, RollingBack)
                | (Failed, RollingBack)
                | (RollingBack, RolledBack)
        )
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition_to(&mut self, next: BatchState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(DbError::InvalidState(format!(
                "batch cannot move from {} to {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "IDLE",
            BatchState::Active => "ACTIVE",
            BatchState::Committing => "COMMITTING",
            BatchState::Committed => "COMMITTED",
            BatchState::Failed => "FAILED",
            BatchState::RollingBack => "ROLLING_BACK",
            BatchState::RolledBack => "ROLLED_BACK",
        };
        write!(f, "{}", name)
    }
}
