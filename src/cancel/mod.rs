//! Per-subscription cancellation.
//!
//! A [`CancelController`] belongs to one logical subscription (a query bound
//! to its current params, say). It owns at most one live [`Lease`]: starting a
//! new call aborts the previous one, and disposing the controller aborts
//! whatever is outstanding and refuses new calls.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// The right to run one call for a subscription.
///
/// The wrapped token is cancelled when the call is superseded, aborted or the
/// subscription is disposed.
#[derive(Debug, Clone)]
pub struct Lease {
    generation: u64,
    token: CancellationToken,
}

impl Lease {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Lease>,
    generation: u64,
    disposed: bool,
}

/// Tracks the outstanding call of a single subscription.
///
/// # Examples
///
/// ```
/// use fetchkit::cancel::CancelController;
///
/// let controller = CancelController::new();
/// let first = controller.begin().unwrap();
/// let second = controller.begin().unwrap();
///
/// assert!(first.is_cancelled());
/// assert!(!second.is_cancelled());
///
/// controller.dispose();
/// assert!(second.is_cancelled());
/// assert!(controller.begin().is_none());
/// ```
#[derive(Debug, Default)]
pub struct CancelController {
    slot: Mutex<Slot>,
}

impl CancelController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Aborts the previous call (if any) and returns the lease for a new one.
    ///
    /// Returns `None` once the controller has been disposed.
    pub fn begin(&self) -> Option<Lease> {
        let mut slot = self.slot();
        if slot.disposed {
            return None;
        }
        if let Some(previous) = slot.current.take() {
            previous.token.cancel();
        }
        slot.generation += 1;
        let lease = Lease {
            generation: slot.generation,
            token: CancellationToken::new(),
        };
        slot.current = Some(lease.clone());
        Some(lease)
    }

    /// Releases `lease` after its call settled, if it is still the current one.
    pub fn finish(&self, lease: &Lease) {
        let mut slot = self.slot();
        if slot
            .current
            .as_ref()
            .is_some_and(|current| current.generation == lease.generation)
        {
            slot.current = None;
        }
    }

    /// Aborts the outstanding call and refuses any further [`begin`](Self::begin).
    pub fn dispose(&self) {
        let mut slot = self.slot();
        slot.disposed = true;
        if let Some(lease) = slot.current.take() {
            lease.token.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.slot().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outstanding(controller: &CancelController) -> bool {
        controller.slot().current.is_some()
    }

    #[test]
    fn begin_supersedes_previous() {
        let controller = CancelController::new();
        let a = controller.begin().unwrap();
        let b = controller.begin().unwrap();
        let c = controller.begin().unwrap();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!c.is_cancelled());
        assert!(outstanding(&controller));
    }

    #[test]
    fn finish_ignores_superseded_lease() {
        let controller = CancelController::new();
        let old = controller.begin().unwrap();
        let current = controller.begin().unwrap();

        controller.finish(&old);
        assert!(outstanding(&controller));

        controller.finish(&current);
        assert!(!outstanding(&controller));
        assert!(!current.is_cancelled());
    }

    #[test]
    fn dispose_is_final() {
        let controller = CancelController::new();
        let lease = controller.begin().unwrap();
        controller.dispose();
        controller.dispose();
        assert!(lease.is_cancelled());
        assert!(controller.is_disposed());
        assert!(controller.begin().is_none());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_supersede() {
        let controller = CancelController::new();
        let first = controller.begin().unwrap();
        let waiter = {
            let token = first.token().clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        controller.begin();
        waiter.await.unwrap();
    }
}
