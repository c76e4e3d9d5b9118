//! Presence Registry
//!
//! Maps user identities to the connection currently serving them. Lookups are
//! keyed by identity, eviction by handle, so removal on disconnect is a linear
//! scan over the entries.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::ConnectionHandle;

/// Identity -> connection map shared by the dispatch engine and the
/// connection lifecycle manager.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<String, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation leaves the map consistent, so a poisoned lock is safe
    // to keep using.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ConnectionHandle>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ConnectionHandle>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `identity` to `handle`, replacing any previous binding.
    ///
    /// Returns the displaced handle when it belonged to a different
    /// connection. The displaced connection is not closed.
    pub fn register(&self, identity: impl Into<String>, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let identity = identity.into();
        let previous = self.write().insert(identity.clone(), handle.clone());

        match previous {
            Some(previous) if previous != handle => {
                debug!(
                    user_id = %identity,
                    previous = %previous.id(),
                    current = %handle.id(),
                    "Identity moved to a new connection"
                );
                Some(previous)
            }
            _ => None,
        }
    }

    /// Current connection for `identity`, if any
    pub fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.read().get(identity).cloned()
    }

    /// Remove every entry bound to `handle`, returning the evicted identities
    pub fn remove_by_handle(&self, handle: &ConnectionHandle) -> Vec<String> {
        let mut entries = self.write();
        let evicted: Vec<String> = entries
            .iter()
            .filter(|(_, bound)| *bound == handle)
            .map(|(identity, _)| identity.clone())
            .collect();

        for identity in &evicted {
            entries.remove(identity);
        }

        evicted
    }

    /// Remove the entry for `identity` only if it still points at `handle`
    pub fn unregister(&self, identity: &str, handle: &ConnectionHandle) -> bool {
        let mut entries = self.write();
        if entries.get(identity) == Some(handle) {
            entries.remove(identity);
            true
        } else {
            false
        }
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.read().contains_key(identity)
    }

    /// Sorted snapshot of the identities that are online
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.read().keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ConnectionLink;
    use std::sync::Arc;

    fn link() -> ConnectionLink {
        ConnectionLink::new(8).0
    }

    #[test]
    fn test_lookup_after_register() {
        let registry = PresenceRegistry::new();
        let h1 = link();

        assert!(registry.register("alice", h1.handle()).is_none());
        assert_eq!(registry.lookup("alice"), Some(h1.handle()));
        assert_eq!(registry.lookup("bob"), None);
    }

    #[test]
    fn test_reregister_overwrites_and_returns_previous() {
        let registry = PresenceRegistry::new();
        let h1 = link();
        let h2 = link();

        registry.register("alice", h1.handle());
        let displaced = registry.register("alice", h2.handle());

        assert_eq!(displaced, Some(h1.handle()));
        assert_eq!(registry.lookup("alice"), Some(h2.handle()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_same_handle_displaces_nothing() {
        let registry = PresenceRegistry::new();
        let h1 = link();

        registry.register("alice", h1.handle());
        assert!(registry.register("alice", h1.handle()).is_none());
    }

    #[test]
    fn test_remove_by_handle() {
        let registry = PresenceRegistry::new();
        let h1 = link();
        let h2 = link();

        registry.register("alice", h1.handle());
        registry.register("bob", h2.handle());

        assert_eq!(registry.remove_by_handle(&h1.handle()), vec!["alice".to_string()]);
        assert_eq!(registry.lookup("alice"), None);
        assert_eq!(registry.lookup("bob"), Some(h2.handle()));
    }

    #[test]
    fn test_remove_unknown_handle_is_noop() {
        let registry = PresenceRegistry::new();
        let h1 = link();
        let stranger = link();

        registry.register("alice", h1.handle());
        assert!(registry.remove_by_handle(&stranger.handle()).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_removing_stale_handle_keeps_newer_binding() {
        let registry = PresenceRegistry::new();
        let h1 = link();
        let h2 = link();

        registry.register("alice", h1.handle());
        registry.register("alice", h2.handle());

        assert!(registry.remove_by_handle(&h1.handle()).is_empty());
        assert_eq!(registry.lookup("alice"), Some(h2.handle()));
    }

    #[test]
    fn test_unregister_requires_matching_handle() {
        let registry = PresenceRegistry::new();
        let h1 = link();
        let h2 = link();

        registry.register("alice", h2.handle());
        assert!(!registry.unregister("alice", &h1.handle()));
        assert!(registry.unregister("alice", &h2.handle()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_online_users_sorted() {
        let registry = PresenceRegistry::new();
        let (a, b, c) = (link(), link(), link());

        registry.register("carol", c.handle());
        registry.register("alice", a.handle());
        registry.register("bob", b.handle());

        assert_eq!(registry.online_users(), vec!["alice", "bob", "carol"]);
        assert!(registry.is_online("bob"));
        assert!(!registry.is_online("dave"));
    }

    #[test]
    fn test_concurrent_register_and_remove() {
        let registry = Arc::new(PresenceRegistry::new());
        let links: Vec<ConnectionLink> = (0..8).map(|_| link()).collect();

        std::thread::scope(|scope| {
            for (worker, link) in links.iter().enumerate() {
                let registry = Arc::clone(&registry);
                let handle = link.handle();
                scope.spawn(move || {
                    for round in 0..200 {
                        let identity = format!("user-{}", (worker + round) % 4);
                        registry.register(identity, handle.clone());
                        if round % 3 == 0 {
                            registry.remove_by_handle(&handle);
                        }
                    }
                    registry.remove_by_handle(&handle);
                });
            }
        });

        assert!(registry.is_empty());
    }
}
