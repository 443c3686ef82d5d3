// ============================================================================
// Completion Barrier
// ============================================================================
//
// Fan-in point for N concurrently running sub-operations. The barrier is
// settled either when every slot holds a result or when the first failure
// arrives; exactly one finalizer call happens per barrier.
//
// ============================================================================

use crate::core::{DbError, Result};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{Level, event};

type Finalizer<T> = Box<dyn FnOnce(Result<Vec<T>>) + Send>;

/// What a single `record_*` call did to the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Recorded; other slots are still outstanding.
    Pending,
    /// This call settled the barrier and ran the finalizer.
    Settled,
    /// The barrier had already settled; the outcome was dropped.
    Discarded,
}

struct BarrierState<T> {
    completed: usize,
    failed: bool,
    settled: bool,
    slots: Vec<Option<T>>,
    discarded: usize,
    finalizer: Option<Finalizer<T>>,
}

pub struct CompletionBarrier<T> {
    target: usize,
    state: Mutex<BarrierState<T>>,
}

impl<T: Send + 'static> CompletionBarrier<T> {
    /// Creates a barrier expecting `target` outcomes.
    ///
    /// With `target == 0` the finalizer runs before this returns, with an
    /// empty aggregate.
    pub fn new<F>(target: usize, finalizer: F) -> Self
    where
        F: FnOnce(Result<Vec<T>>) + Send + 'static,
    {
        let mut finalizer: Option<Finalizer<T>> = Some(Box::new(finalizer));
        let settled = target == 0;
        if settled && let Some(finalize) = finalizer.take() {
            event!(Level::DEBUG, "completion barrier settled with no slots");
            finalize(Ok(Vec::new()));
        }

        Self {
            target,
            state: Mutex::new(BarrierState {
                completed: 0,
                failed: false,
                settled,
                slots: (0..target).map(|_| None).collect(),
                discarded: 0,
                finalizer,
            }),
        }
    }

    /// Creates a barrier whose finalizer delivers into the returned
    /// [`Settled`] handle.
    pub fn channel(target: usize) -> (Self, Settled<T>) {
        let (tx, rx) = oneshot::channel();
        let barrier = Self::new(target, move |outcome| {
            // The receiver may already be gone; nothing left to deliver to.
            let _ = tx.send(outcome);
        });
        (barrier, Settled { rx })
    }

    /// Stores `item` in `slot`.
    ///
    /// Fails with [`DbError::InvalidInput`] for an out-of-range or already
    /// filled slot, leaving the barrier untouched.
    pub fn record_success(&self, slot: usize, item: T) -> Result<Settlement> {
        let mut state = self.state.lock()?;

        if state.settled {
            state.discarded += 1;
            event!(Level::DEBUG, slot, "late success discarded by settled barrier");
            return Ok(Settlement::Discarded);
        }

        let Some(entry) = state.slots.get_mut(slot) else {
            return Err(DbError::InvalidInput(format!(
                "slot {} out of range for barrier of {}",
                slot, self.target
            )));
        };
        if entry.is_some() {
            return Err(DbError::InvalidInput(format!("slot {} already recorded", slot)));
        }
        *entry = Some(item);
        state.completed += 1;

        if state.completed < self.target {
            return Ok(Settlement::Pending);
        }

        state.settled = true;
        let items: Vec<T> = state.slots.iter_mut().filter_map(Option::take).collect();
        let finalizer = state.finalizer.take();
        drop(state);

        event!(Level::DEBUG, target = self.target, "completion barrier settled");
        if let Some(finalize) = finalizer {
            finalize(Ok(items));
        }
        Ok(Settlement::Settled)
    }

    /// Records a failed sub-operation. Only the first failure is delivered.
    pub fn record_failure(&self, err: DbError) -> Result<Settlement> {
        let mut state = self.state.lock()?;

        if state.settled {
            state.discarded += 1;
            event!(Level::DEBUG, error = %err, "late failure discarded by settled barrier");
            return Ok(Settlement::Discarded);
        }

        state.settled = true;
        state.failed = true;
        state.slots.clear();
        let finalizer = state.finalizer.take();
        drop(state);

        event!(Level::DEBUG, error = %err, "completion barrier settled on failure");
        if let Some(finalize) = finalizer {
            finalize(Err(err));
        }
        Ok(Settlement::Settled)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn completed(&self) -> usize {
        self.state.lock().map(|s| s.completed).unwrap_or_default()
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().map(|s| s.settled).unwrap_or(true)
    }

    pub fn has_failed(&self) -> bool {
        self.state.lock().map(|s| s.failed).unwrap_or(true)
    }

    /// Outcomes that arrived after settlement.
    pub fn discarded(&self) -> usize {
        self.state.lock().map(|s| s.discarded).unwrap_or_default()
    }
}

/// Receiving end of [`CompletionBarrier::channel`].
pub struct Settled<T> {
    rx: oneshot::Receiver<Result<Vec<T>>>,
}

impl<T> Settled<T> {
    /// Waits for the barrier to settle.
    pub async fn wait(self) -> Result<Vec<T>> {
        self.rx.await.map_err(|_| {
            DbError::InvalidState("completion barrier dropped before settling".into())
        })?
    }

    /// Returns the outcome if the barrier has already settled.
    pub fn try_take(&mut self) -> Option<Result<Vec<T>>> {
        self.rx.try_recv().ok()
    }
}
