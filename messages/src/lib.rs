//! Overlay message types for flood peer-to-peer and peer-to-tracker traffic.
//!
//! Every message carries the sender's [`Contact`] by value so the receiver
//! can answer without any lookup.

use flood_types::Contact;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All message kinds in the overlay protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    JoinRequest,
    JoinReply,
    ConnectPeersRequest,
    ConnectPeersReply,
    DisconnectPeers,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinRequest => "join_request",
            Self::JoinReply => "join_reply",
            Self::ConnectPeersRequest => "connect_peers_request",
            Self::ConnectPeersReply => "connect_peers_reply",
            Self::DisconnectPeers => "disconnect_peers",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peer → tracker: register and ask for an initial neighborhood.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub sender: Contact,
}

/// Tracker → peer: a bounded random subset of known contacts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinReply {
    pub sender: Contact,
    pub neighbors: Vec<Contact>,
}

/// Peer → peer: ask to establish an overlay link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectPeersRequest {
    pub sender: Contact,
    /// The sender's connected neighbors, only present when neighbor sharing
    /// is enabled on the sender.
    pub neighbors: Option<Vec<Contact>>,
}

/// Peer → peer: answer to a [`ConnectPeersRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectPeersReply {
    pub sender: Contact,
    pub accepted: bool,
}

/// Peer → peer: withdraw a link the sender does not keep. No reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisconnectPeers {
    pub sender: Contact,
}

/// Top-level overlay message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OverlayMessage {
    JoinRequest(JoinRequest),
    JoinReply(JoinReply),
    ConnectPeersRequest(ConnectPeersRequest),
    ConnectPeersReply(ConnectPeersReply),
    DisconnectPeers(DisconnectPeers),
}

impl OverlayMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::JoinRequest(_) => MessageKind::JoinRequest,
            Self::JoinReply(_) => MessageKind::JoinReply,
            Self::ConnectPeersRequest(_) => MessageKind::ConnectPeersRequest,
            Self::ConnectPeersReply(_) => MessageKind::ConnectPeersReply,
            Self::DisconnectPeers(_) => MessageKind::DisconnectPeers,
        }
    }

    pub fn sender(&self) -> &Contact {
        match self {
            Self::JoinRequest(m) => &m.sender,
            Self::JoinReply(m) => &m.sender,
            Self::ConnectPeersRequest(m) => &m.sender,
            Self::ConnectPeersReply(m) => &m.sender,
            Self::DisconnectPeers(m) => &m.sender,
        }
    }

    /// Estimated bytes on the wire: the sender contact plus any carried
    /// contacts, plus one byte for the accept flag of a reply.
    pub fn transmission_size(&self) -> usize {
        let contacts = |list: &[Contact]| list.iter().map(Contact::transmission_size).sum::<usize>();
        let base = self.sender().transmission_size();
        match self {
            Self::JoinRequest(_) | Self::DisconnectPeers(_) => base,
            Self::JoinReply(m) => base + contacts(&m.neighbors),
            Self::ConnectPeersRequest(m) => base + m.neighbors.as_deref().map_or(0, contacts),
            Self::ConnectPeersReply(_) => base + 1,
        }
    }
}

impl From<JoinRequest> for OverlayMessage {
    fn from(m: JoinRequest) -> Self {
        Self::JoinRequest(m)
    }
}

impl From<JoinReply> for OverlayMessage {
    fn from(m: JoinReply) -> Self {
        Self::JoinReply(m)
    }
}

impl From<ConnectPeersRequest> for OverlayMessage {
    fn from(m: ConnectPeersRequest) -> Self {
        Self::ConnectPeersRequest(m)
    }
}

impl From<ConnectPeersReply> for OverlayMessage {
    fn from(m: ConnectPeersReply) -> Self {
        Self::ConnectPeersReply(m)
    }
}

impl From<DisconnectPeers> for OverlayMessage {
    fn from(m: DisconnectPeers) -> Self {
        Self::DisconnectPeers(m)
    }
}

impl fmt::Display for OverlayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JoinRequest(m) => write!(f, "JOIN TRACKER {}", m.sender),
            Self::JoinReply(m) => write!(f, "JOIN REPLY neighbors: {}", m.neighbors.len()),
            Self::ConnectPeersRequest(m) => write!(f, "CONNECT PEERS from {}", m.sender.node_id()),
            Self::ConnectPeersReply(m) => write!(
                f,
                "CONNECT PEERS REPLY from {} accepted={}",
                m.sender.node_id(),
                m.accepted
            ),
            Self::DisconnectPeers(m) => write!(f, "DISCONNECT PEERS from {}", m.sender.node_id()),
        }
    }
}
