//! Overlay membership state of a peer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overlay membership state.
///
/// This says nothing about network-layer connectivity: a peer can be
/// `Present` while its interface is down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerStatus {
    /// Not part of the overlay.
    #[default]
    Absent,
    /// A join request is in flight.
    ToJoin,
    /// Joined; the maintenance operation is running.
    Present,
}

impl PeerStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "ABSENT",
            Self::ToJoin => "TO_JOIN",
            Self::Present => "PRESENT",
        };
        f.write_str(s)
    }
}
