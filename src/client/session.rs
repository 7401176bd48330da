//! Credential access and the once-per-episode "session invalidated" signal.
//!
//! Every call captures the session epoch when it is issued. The first 401
//! reply among calls issued in the same epoch advances the epoch and fires the
//! callback; later 401s from that epoch find it already advanced and stay
//! silent. Calls issued after the invalidation belong to a new episode.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// Returns the bearer token to attach, if any.
pub type CredentialFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Invoked when the server rejects the current credential.
pub type InvalidatedFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct Session {
    credentials: Option<CredentialFn>,
    on_invalidated: Option<InvalidatedFn>,
    epoch: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("has_credentials", &self.credentials.is_some())
            .field("has_callback", &self.on_invalidated.is_some())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

impl Session {
    pub(crate) fn new(credentials: Option<CredentialFn>, on_invalidated: Option<InvalidatedFn>) -> Self {
        Self {
            credentials,
            on_invalidated,
            epoch: AtomicU64::new(0),
        }
    }

    /// Current credential from the caller-supplied accessor.
    pub(crate) fn credential(&self) -> Option<String> {
        self.credentials.as_ref().and_then(|f| f())
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Reports a 401 for a call issued in `seen_epoch`.
    ///
    /// Returns `true` if this report opened a new invalidation episode (and
    /// fired the callback).
    pub(crate) fn invalidate(&self, seen_epoch: u64) -> bool {
        let opened = self
            .epoch
            .compare_exchange(seen_epoch, seen_epoch + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if opened {
            warn!(epoch = seen_epoch, "credential rejected; session invalidated");
            if let Some(callback) = &self.on_invalidated {
                callback();
            }
        }
        opened
    }
}
