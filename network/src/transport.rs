//! Transport seam between overlay logic and the host environment.
//!
//! The overlay only needs three primitives: fire-and-forget send, send and
//! await a reply with a timeout, and reply to a received request, plus the
//! host's interface switch. A reply that misses its timeout is still handed
//! to the requester, as a [`Delivery`] with `late_reply_to` set. Binding a
//! node to an endpoint is a separate capability ([`TransportBinder`]) so a
//! node composes both rather than inheriting them.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use flood_messages::OverlayMessage;
use flood_types::{Contact, NodeId};
use tokio::sync::mpsc;

use crate::NetworkError;

/// Correlates a reply with the request it answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A message handed to a bound node.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub from: NodeId,
    /// Set when the sender awaits a reply via [`Transport::send_reply`].
    pub request_id: Option<RequestId>,
    /// Set when `message` answers a request of ours that already timed out.
    pub late_reply_to: Option<RequestId>,
    pub message: OverlayMessage,
}

/// Receiving side of a bound endpoint.
pub type Inbox = mpsc::UnboundedReceiver<Delivery>;

/// Message transport used by a single bound node.
pub trait Transport: Send + Sync {
    /// Identity this transport sends as.
    fn local_id(&self) -> NodeId;

    /// Best-effort delivery; no reply is expected.
    fn send(&self, message: OverlayMessage, destination: &Contact) -> Result<(), NetworkError>;

    /// Send `message` and wait up to `timeout` for the reply.
    fn request(
        &self,
        message: OverlayMessage,
        destination: &Contact,
        timeout: Duration,
    ) -> impl Future<Output = Result<OverlayMessage, NetworkError>> + Send;

    /// Answer a request received with `request_id`.
    fn send_reply(&self, message: OverlayMessage, request_id: RequestId) -> Result<(), NetworkError>;

    /// Bring the node's network interface up or down. While down, nothing
    /// is sent to or from the node.
    fn set_online(&self, online: bool);
}

/// Binds a contact to a transport endpoint.
pub trait TransportBinder {
    type Transport: Transport;

    fn bind(&self, contact: &Contact) -> Result<(Self::Transport, Inbox), NetworkError>;
}
