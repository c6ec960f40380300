//! Nullable presence listener: record status transitions.

use std::sync::Mutex;

use flood_network::PresenceListener;
use flood_types::{NodeId, PeerStatus};

/// Records every status transition it is notified of.
#[derive(Default)]
pub struct RecordingListener {
    transitions: Mutex<Vec<(NodeId, PeerStatus, PeerStatus)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded `(node, old, new)` transitions, oldest first.
    pub fn transitions(&self) -> Vec<(NodeId, PeerStatus, PeerStatus)> {
        self.transitions.lock().unwrap().clone()
    }

    /// The statuses entered, oldest first.
    pub fn entered(&self) -> Vec<PeerStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, new)| *new)
            .collect()
    }
}

impl PresenceListener for RecordingListener {
    fn status_changed(&self, node: NodeId, old: PeerStatus, new: PeerStatus) {
        self.transitions.lock().unwrap().push((node, old, new));
    }
}
