//! Overlay membership notifications.
//!
//! A node composes a [`PresenceNotifier`] to track its own [`PeerStatus`]
//! and to tell interested parties when it changes.

use std::fmt;
use std::sync::Arc;

use flood_types::{NodeId, PeerStatus};

/// Receives overlay membership changes of a node.
pub trait PresenceListener: Send + Sync {
    fn status_changed(&self, node: NodeId, old: PeerStatus, new: PeerStatus);
}

/// Current membership status plus the listeners to notify on change.
#[derive(Default)]
pub struct PresenceNotifier {
    status: PeerStatus,
    listeners: Vec<Arc<dyn PresenceListener>>,
}

impl PresenceNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PresenceListener>) {
        self.listeners.push(listener);
    }

    pub fn status(&self) -> PeerStatus {
        self.status
    }

    /// Move to `status`, notifying listeners if it differs from the current
    /// one. Returns `true` if the status changed.
    pub fn set_status(&mut self, node: NodeId, status: PeerStatus) -> bool {
        let old = self.status;
        if old == status {
            return false;
        }
        self.status = status;
        tracing::trace!(%node, ?old, new = ?status, "presence changed");
        for listener in &self.listeners {
            listener.status_changed(node, old, status);
        }
        true
    }
}

impl fmt::Debug for PresenceNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceNotifier")
            .field("status", &self.status)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counter(Mutex<Vec<(PeerStatus, PeerStatus)>>);

    impl PresenceListener for Counter {
        fn status_changed(&self, _node: NodeId, old: PeerStatus, new: PeerStatus) {
            self.0.lock().unwrap().push((old, new));
        }
    }

    #[test]
    fn notifies_only_on_change() {
        let counter = Arc::new(Counter::default());
        let mut notifier = PresenceNotifier::new();
        notifier.add_listener(counter.clone());

        assert!(notifier.set_status(NodeId::new(1), PeerStatus::ToJoin));
        assert!(!notifier.set_status(NodeId::new(1), PeerStatus::ToJoin));
        assert!(notifier.set_status(NodeId::new(1), PeerStatus::Present));

        let seen = counter.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (PeerStatus::Absent, PeerStatus::ToJoin),
                (PeerStatus::ToJoin, PeerStatus::Present),
            ]
        );
    }
}
