//! Pre-built [`tracing::Span`] constructors for common overlay operations.
//!
//! Using consistent span names and field sets across the codebase makes it
//! easy to filter and correlate one node's protocol steps in the logs.

use flood_messages::MessageKind;
use flood_types::NodeId;
use tracing::{info_span, Span};

/// Span covering one join exchange of a peer with the tracker.
pub fn join_span(peer: NodeId) -> Span {
    info_span!("join", peer = %peer)
}

/// Span covering a single maintenance cycle of a peer.
pub fn maintenance_span(peer: NodeId) -> Span {
    info_span!("maintenance", peer = %peer)
}

/// Span covering the handling of a single inbound message at a peer.
pub fn inbound_span(peer: NodeId, from: NodeId, kind: MessageKind) -> Span {
    info_span!("inbound", peer = %peer, from = %from, msg_type = %kind)
}

/// Span covering one request handled by the tracker.
pub fn tracker_request_span(tracker: NodeId, from: NodeId, kind: MessageKind) -> Span {
    info_span!("tracker_request", tracker = %tracker, from = %from, msg_type = %kind)
}
