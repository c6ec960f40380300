//! Peer side of the overlay: neighbor sets, admission control and the
//! ConnectPeers exchange.
//!
//! [`OverlayNode`] does no I/O of its own apart from fire-and-forget sends
//! and replies. Anything that waits for a reply is handed back to the caller
//! as an [`OutboundRequest`], and the reply (or the timeout) is fed back in
//! through [`OverlayNode::on_connect_reply`] or
//! [`OverlayNode::complete_join`]. Every method takes `&mut self`, so all
//! budget and neighbor mutations of one node are serialized by construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::RngCore;

use flood_messages::{ConnectPeersReply, ConnectPeersRequest, DisconnectPeers, OverlayMessage};
use flood_network::{
    AdmissionController, Delivery, LinkDirection, NeighborTable, NetworkError, PresenceListener,
    PresenceNotifier, Transport,
};
use flood_types::{Contact, NodeId, PeerStatus};

use crate::settings::Settings;
use crate::tracing_spans;
use crate::NodeError;

/// A message that expects a reply within the message timeout.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub destination: Contact,
    pub message: OverlayMessage,
}

/// Result of one outbound connection attempt.
#[derive(Clone, Debug)]
pub enum AttemptOutcome {
    /// A ConnectPeers request is ready to be sent.
    Sent(OutboundRequest),
    /// No candidate was left. The attempt unit and the outbound slot were
    /// given back.
    NoCandidate,
    /// The lifetime attempt budget is used up. The outbound slot was given
    /// back.
    AttemptsExhausted,
}

/// Point-in-time view of a node, for harnesses and assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub status: PeerStatus,
    pub reachable: bool,
    pub connected: Vec<NodeId>,
    pub potential: Vec<NodeId>,
    pub in_flight: usize,
    pub target_degree: usize,
    pub inbound_available: usize,
    pub outbound_available: usize,
    pub attempts_remaining: usize,
}

impl NodeSnapshot {
    pub fn degree(&self) -> usize {
        self.connected.len()
    }
}

/// A peer of the overlay.
pub struct OverlayNode<T> {
    pub(crate) contact: Contact,
    pub(crate) tracker: Contact,
    pub(crate) settings: Settings,
    pub(crate) presence: PresenceNotifier,
    pub(crate) neighbors: NeighborTable,
    pub(crate) admission: AdmissionController,
    pub(crate) transport: Arc<T>,
    pub(crate) rng: Box<dyn RngCore + Send>,
    /// Outbound ConnectPeers requests awaiting a reply, each holding one
    /// leased outbound slot.
    pub(crate) in_flight: BTreeMap<NodeId, Contact>,
    pub(crate) reachable: bool,
    pub(crate) join_failures: u32,
}

impl<T: Transport> OverlayNode<T> {
    pub fn new(
        contact: Contact,
        tracker: Contact,
        settings: Settings,
        transport: Arc<T>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        let id = contact.node_id();
        Self {
            contact,
            tracker,
            settings,
            presence: PresenceNotifier::new(),
            neighbors: NeighborTable::new(id),
            admission: AdmissionController::new(),
            transport,
            rng,
            in_flight: BTreeMap::new(),
            reachable: true,
            join_failures: 0,
        }
    }

    pub fn add_presence_listener(&mut self, listener: Arc<dyn PresenceListener>) {
        self.presence.add_listener(listener);
    }

    pub fn id(&self) -> NodeId {
        self.contact.node_id()
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn tracker(&self) -> &Contact {
        &self.tracker
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status(&self) -> PeerStatus {
        self.presence.status()
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn set_status(&mut self, status: PeerStatus) -> bool {
        let id = self.id();
        self.presence.set_status(id, status)
    }

    // -- Outbound --------------------------------------------------------------

    /// Try to connect to one random candidate.
    ///
    /// The caller must hold a leased outbound slot. It travels with the
    /// returned request, or is given back when no request is produced.
    pub fn connect_to_someone(&mut self) -> AttemptOutcome {
        if !self.admission.try_spend_attempt() {
            self.admission.release_outbound();
            tracing::debug!(peer = %self.id(), "attempt budget exhausted");
            return AttemptOutcome::AttemptsExhausted;
        }

        let candidate = loop {
            match self.neighbors.take_random_potential(&mut *self.rng) {
                Some(c) if self.in_flight.contains_key(&c.node_id()) => continue,
                other => break other,
            }
        };
        let Some(candidate) = candidate else {
            self.admission.refund_attempt();
            self.admission.release_outbound();
            tracing::debug!(peer = %self.id(), "no candidate left");
            return AttemptOutcome::NoCandidate;
        };

        let neighbors = self
            .settings
            .share_neighbors()
            .then(|| self.neighbors.connected_contacts());
        let message = ConnectPeersRequest {
            sender: self.contact.clone(),
            neighbors,
        }
        .into();

        tracing::debug!(
            peer = %self.id(),
            candidate = %candidate.node_id(),
            attempts = self.admission.attempts_remaining(),
            "sending connect request"
        );
        self.in_flight.insert(candidate.node_id(), candidate.clone());
        AttemptOutcome::Sent(OutboundRequest {
            destination: candidate,
            message,
        })
    }

    /// Feed back the outcome of a ConnectPeers request sent to `peer`.
    ///
    /// A rejection or a failed exchange drops the candidate for good and
    /// retries with another one on the same outbound slot, which may yield
    /// the next request to send. An acceptance from a peer with no request
    /// in flight is a late reply, see [`OverlayNode::on_late_accept`]; any
    /// other outcome for such a peer is ignored.
    pub fn on_connect_reply(
        &mut self,
        peer: NodeId,
        result: Result<OverlayMessage, NetworkError>,
    ) -> Result<Option<OutboundRequest>, NodeError> {
        let Some(contact) = self.in_flight.remove(&peer) else {
            match result {
                Ok(OverlayMessage::ConnectPeersReply(reply)) if reply.accepted => {
                    self.on_late_accept(reply.sender)
                }
                _ => {
                    tracing::debug!(peer = %self.id(), from = %peer, "no connect request in flight, reply ignored");
                }
            }
            return Ok(None);
        };

        let accepted = match result {
            Ok(OverlayMessage::ConnectPeersReply(reply)) => reply.accepted,
            Ok(other) => {
                self.admission.release_outbound();
                return Err(NodeError::ProtocolViolation(format!(
                    "{peer} answered a connect request with {}",
                    other.kind()
                )));
            }
            Err(e) => {
                tracing::debug!(peer = %self.id(), candidate = %peer, error = %e, "connect request failed");
                false
            }
        };

        if accepted {
            if self.neighbors.connect(contact, LinkDirection::Outbound) {
                self.admission.confirm_outbound();
                tracing::debug!(
                    peer = %self.id(),
                    neighbor = %peer,
                    degree = self.neighbors.connected_len(),
                    "outbound link established"
                );
            } else {
                // already linked the other way round
                self.admission.release_outbound();
            }
            return Ok(None);
        }

        tracing::debug!(peer = %self.id(), candidate = %peer, accepted, "connect request not accepted");
        if !self.reachable || !self.status().is_present() {
            self.admission.release_outbound();
            return Ok(None);
        }
        match self.connect_to_someone() {
            AttemptOutcome::Sent(request) => Ok(Some(request)),
            AttemptOutcome::NoCandidate | AttemptOutcome::AttemptsExhausted => Ok(None),
        }
    }

    /// `acceptor` linked us in after our request to it had timed out. Keep
    /// the link if an outbound slot is free, otherwise ask the acceptor to
    /// drop it so neither side holds a one-sided link.
    fn on_late_accept(&mut self, acceptor: Contact) {
        let acceptor_id = acceptor.node_id();
        if acceptor_id == self.id() || self.neighbors.is_connected(&acceptor_id) {
            return;
        }
        if self.status().is_present() && self.admission.lease_outbound() {
            self.neighbors.connect(acceptor, LinkDirection::Outbound);
            self.admission.confirm_outbound();
            tracing::debug!(
                peer = %self.id(),
                neighbor = %acceptor_id,
                degree = self.neighbors.connected_len(),
                "late acceptance, outbound link established"
            );
            return;
        }

        tracing::debug!(peer = %self.id(), neighbor = %acceptor_id, "late acceptance without a free slot, withdrawing");
        let message = DisconnectPeers {
            sender: self.contact.clone(),
        };
        if let Err(e) = self.transport.send(message.into(), &acceptor) {
            tracing::warn!(peer = %self.id(), to = %acceptor_id, error = %e, "disconnect not sent");
        }
    }

    // -- Inbound ---------------------------------------------------------------

    /// Decide on an inbound ConnectPeers request.
    ///
    /// A peer that is already connected is accepted again without spending
    /// an inbound slot.
    pub fn on_connect_request(&mut self, request: ConnectPeersRequest) -> ConnectPeersReply {
        let requester = request.sender;
        let requester_id = requester.node_id();

        let accepted = if requester_id == self.id() {
            false
        } else if self.neighbors.is_connected(&requester_id) {
            true
        } else if self.admission.try_admit_inbound() {
            self.neighbors.connect(requester, LinkDirection::Inbound);
            true
        } else {
            false
        };

        tracing::debug!(
            peer = %self.id(),
            requester = %requester_id,
            accepted,
            budget = self.admission.inbound_available(),
            "connect request handled"
        );

        if self.settings.share_neighbors() {
            if let Some(shared) = request.neighbors {
                let added = self.neighbors.extend_potential(shared);
                if added > 0 {
                    tracing::trace!(peer = %self.id(), added, "harvested shared neighbors");
                }
            }
        }

        ConnectPeersReply {
            sender: self.contact.clone(),
            accepted,
        }
    }

    /// Handle a message the transport delivered to this node. A connect
    /// reply arriving this way may yield the next request to send.
    pub fn handle_delivery(
        &mut self,
        delivery: Delivery,
    ) -> Result<Option<OutboundRequest>, NodeError> {
        let _span =
            tracing_spans::inbound_span(self.id(), delivery.from, delivery.message.kind()).entered();

        match delivery.message {
            OverlayMessage::ConnectPeersRequest(request) => {
                let requester = request.sender.clone();
                let reply: OverlayMessage = self.on_connect_request(request).into();
                let sent = match delivery.request_id {
                    Some(request_id) => self.transport.send_reply(reply, request_id),
                    None => self.transport.send(reply, &requester),
                };
                if let Err(e) = sent {
                    tracing::warn!(peer = %self.id(), to = %requester.node_id(), error = %e, "connect reply not sent");
                }
                Ok(None)
            }
            message @ OverlayMessage::ConnectPeersReply(_) => {
                self.on_connect_reply(delivery.from, Ok(message))
            }
            OverlayMessage::DisconnectPeers(_) => {
                self.on_neighbor_lost(delivery.from);
                Ok(None)
            }
            OverlayMessage::JoinReply(_) if delivery.late_reply_to.is_some() => {
                tracing::debug!(peer = %self.id(), from = %delivery.from, "late join reply ignored");
                Ok(None)
            }
            OverlayMessage::JoinReply(_) => Err(NodeError::ProtocolViolation(format!(
                "peer {} received an unsolicited join reply from {}",
                self.id(),
                delivery.from
            ))),
            OverlayMessage::JoinRequest(_) => Err(NodeError::ProtocolViolation(format!(
                "peer {} received a join request from {}",
                self.id(),
                delivery.from
            ))),
        }
    }

    // -- Host notifications ----------------------------------------------------

    /// A connected neighbor went away. Frees the admission slot its link
    /// occupied; the attempt budget is not refilled.
    pub fn on_neighbor_lost(&mut self, neighbor: NodeId) -> bool {
        match self.neighbors.disconnect(&neighbor) {
            Some(link) => {
                self.admission.release_link(link.direction);
                tracing::debug!(
                    peer = %self.id(),
                    %neighbor,
                    direction = ?link.direction,
                    "neighbor lost"
                );
                true
            }
            None => false,
        }
    }

    /// Take the node's network interface down: no messages in or out, and
    /// no outbound attempts until [`OverlayNode::interface_up`].
    pub fn interface_down(&mut self) {
        if self.reachable {
            tracing::info!(peer = %self.id(), "interface down");
        }
        self.reachable = false;
        self.transport.set_online(false);
    }

    pub fn interface_up(&mut self) {
        if !self.reachable {
            tracing::info!(peer = %self.id(), "interface up");
        }
        self.reachable = true;
        self.transport.set_online(true);
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id(),
            status: self.status(),
            reachable: self.reachable,
            connected: self.neighbors.connected_ids(),
            potential: self.neighbors.potential_ids(),
            in_flight: self.in_flight.len(),
            target_degree: self.admission.target_degree(),
            inbound_available: self.admission.inbound_available(),
            outbound_available: self.admission.outbound_available(),
            attempts_remaining: self.admission.attempts_remaining(),
        }
    }
}
