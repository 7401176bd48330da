//! Single-flight registry of in-flight calls.
//!
//! The client registers a call *before* the transport is spawned, inside the
//! same critical section as its cache and dedup lookups, so two callers racing
//! on one key can never both dispatch. Settling a call removes its entry; the
//! window is only a bound for calls that hang or outlive a clock jump.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// An in-flight call as stored in the registry.
#[derive(Debug, Clone)]
pub struct Pending<P> {
    pub promise: P,
    pub started_at: Instant,
    /// Identifies this registration so a late settle cannot remove a newer one.
    pub ticket: u64,
}

/// Key → in-flight promise map with a deduplication window.
///
/// `P` is whatever handle callers share to await one result (the client uses a
/// [`futures::future::Shared`] future).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fetchkit::dedup::DedupRegistry;
///
/// let mut registry = DedupRegistry::new(Duration::from_secs(1));
/// let ticket = registry.register("GET:/models::null", "call-1");
///
/// assert_eq!(registry.lookup("GET:/models::null"), Some("call-1"));
/// assert!(registry.complete("GET:/models::null", ticket));
/// assert_eq!(registry.lookup("GET:/models::null"), None);
/// ```
#[derive(Debug)]
pub struct DedupRegistry<P> {
    pending: HashMap<String, Pending<P>>,
    window: Duration,
    next_ticket: u64,
}

impl<P: Clone> DedupRegistry<P> {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
            next_ticket: 0,
        }
    }

    /// Records `promise` as the in-flight call for `key` and returns its ticket.
    ///
    /// Replaces any previous registration for `key`.
    pub fn register(&mut self, key: impl Into<String>, promise: P) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(
            key.into(),
            Pending {
                promise,
                started_at: Instant::now(),
                ticket,
            },
        );
        ticket
    }

    /// Returns the shared promise for `key` if it was registered within the window.
    ///
    /// An entry older than the window is evicted and reported as a miss.
    pub fn lookup(&mut self, key: &str) -> Option<P> {
        let now = Instant::now();
        let entry = self.pending.get(key)?;
        if now.saturating_duration_since(entry.started_at) < self.window {
            return Some(entry.promise.clone());
        }
        debug!(key, ticket = entry.ticket, "in-flight entry outlived dedup window");
        self.pending.remove(key);
        None
    }

    /// Removes the entry for `key` if it still belongs to `ticket`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn complete(&mut self, key: &str, ticket: u64) -> bool {
        match self.pending.get(key) {
            Some(entry) if entry.ticket == ticket => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const WINDOW: Duration = Duration::from_millis(1_000);

    #[tokio::test(start_paused = true)]
    async fn lookup_within_window_shares_promise() {
        let mut registry = DedupRegistry::new(WINDOW);
        registry.register("k", 7);
        advance(Duration::from_millis(5)).await;
        assert_eq!(registry.lookup("k"), Some(7));
        assert_eq!(registry.lookup("k"), Some(7));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_on_lookup() {
        let mut registry = DedupRegistry::new(WINDOW);
        registry.register("k", 7);
        advance(WINDOW).await;
        assert_eq!(registry.lookup("k"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn complete_removes_inside_window() {
        let mut registry = DedupRegistry::new(WINDOW);
        let ticket = registry.register("k", 1);
        assert!(registry.complete("k", ticket));
        assert!(registry.is_empty());
        assert!(!registry.complete("k", ticket));
    }

    #[test]
    fn stale_ticket_does_not_remove_newer_registration() {
        let mut registry = DedupRegistry::new(WINDOW);
        let old = registry.register("k", 1);
        let new = registry.register("k", 2);
        assert_ne!(old, new);

        assert!(!registry.complete("k", old));
        assert_eq!(registry.lookup("k"), Some(2));
        assert!(registry.complete("k", new));
    }

    #[test]
    fn keys_are_independent() {
        let mut registry = DedupRegistry::new(WINDOW);
        let a = registry.register("a", 1);
        registry.register("b", 2);
        registry.complete("a", a);
        assert_eq!(registry.lookup("a"), None);
        assert_eq!(registry.lookup("b"), Some(2));
    }
}
