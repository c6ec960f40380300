//! The periodic maintenance operation of a present peer.
//!
//! Each cycle drops connected peers from the candidate set, sizes the
//! admission budgets on the first cycle, and then starts outbound attempts
//! while both an attempt unit and an outbound slot are available.

use flood_network::Transport;

use crate::peer::{AttemptOutcome, OutboundRequest, OverlayNode};
use crate::tracing_spans;

impl<T: Transport> OverlayNode<T> {
    /// Run one maintenance cycle, returning the ConnectPeers requests to
    /// send. Does nothing unless the node is present.
    pub fn run_maintenance(&mut self) -> Vec<OutboundRequest> {
        if !self.status().is_present() {
            return Vec::new();
        }
        let _span = tracing_spans::maintenance_span(self.id()).entered();

        let purged = self.neighbors.purge_connected();
        let target_degree = self.settings.max_num_connections();
        self.admission.initialize(target_degree, &mut *self.rng);

        if !self.reachable {
            tracing::debug!(peer = %self.id(), "unreachable, skipping outbound attempts");
            return Vec::new();
        }

        let mut requests = Vec::new();
        while self.admission.has_attempts() && self.admission.lease_outbound() {
            match self.connect_to_someone() {
                AttemptOutcome::Sent(request) => requests.push(request),
                AttemptOutcome::NoCandidate | AttemptOutcome::AttemptsExhausted => break,
            }
        }

        tracing::debug!(
            peer = %self.id(),
            purged,
            sent = requests.len(),
            degree = self.neighbors.connected_len(),
            outbound = self.admission.outbound_available(),
            attempts = self.admission.attempts_remaining(),
            "maintenance cycle"
        );
        requests
    }
}

#[cfg(test)]
mod tests {
    use crate::peer::OverlayNode;
    use crate::settings::{Param, Settings};
    use flood_messages::{ConnectPeersReply, MessageKind};
    use flood_network::LinkDirection;
    use flood_nullables::{NullRandom, NullTransport};
    use flood_types::{Contact, Endpoint, NodeId, PeerStatus};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn contact(id: u64) -> Contact {
        Contact::peer(
            NodeId::new(id),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, id as u8)), 6666),
        )
    }

    fn present_node(degree: u64) -> OverlayNode<NullTransport> {
        let settings = Settings::default().with_param(Param::MaxNumConnections, degree);
        let mut node = OverlayNode::new(
            contact(1),
            Contact::tracker(NodeId::new(0), Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6666)),
            settings,
            Arc::new(NullTransport::new(NodeId::new(1))),
            Box::new(NullRandom::zeros()),
        );
        node.set_status(PeerStatus::Present);
        node
    }

    #[test]
    fn absent_node_does_nothing() {
        let mut node = present_node(4);
        node.set_status(PeerStatus::Absent);
        node.neighbors.add_potential(contact(2));
        assert!(node.run_maintenance().is_empty());
        assert!(!node.admission().is_initialized());
    }

    #[test]
    fn empty_candidates_send_nothing_and_keep_slots() {
        let mut node = present_node(4);
        let requests = node.run_maintenance();
        assert!(requests.is_empty());
        assert!(node.transport().sent().is_empty());
        assert_eq!(node.admission().outbound_available(), 2);
        assert_eq!(node.admission().attempts_remaining(), 400);
    }

    #[test]
    fn first_cycle_sizes_budgets_once() {
        // NullRandom::zeros puts the spare slot of an odd degree on inbound
        let mut node = present_node(5);
        node.run_maintenance();
        assert_eq!(node.admission().target_degree(), 5);
        assert_eq!(node.admission().inbound_available(), 3);
        assert_eq!(node.admission().outbound_available(), 2);

        node.settings.set_param(Param::MaxNumConnections, 9);
        node.run_maintenance();
        assert_eq!(node.admission().target_degree(), 5);
    }

    #[test]
    fn fills_outbound_slots() {
        let mut node = present_node(4);
        node.neighbors.extend_potential([contact(2), contact(3), contact(4)]);
        let requests = node.run_maintenance();

        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.message.kind() == MessageKind::ConnectPeersRequest));
        assert_eq!(node.admission().outbound_available(), 0);
        assert_eq!(node.in_flight_len(), 2);
        assert_eq!(node.neighbors().potential_len(), 1);

        // all slots are out: the next cycle sends nothing
        assert!(node.run_maintenance().is_empty());
    }

    #[test]
    fn connected_peers_are_never_candidates() {
        let mut node = present_node(4);
        node.neighbors.connect(contact(2), LinkDirection::Inbound);
        node.neighbors.extend_potential([contact(2), contact(3)]);
        let requests = node.run_maintenance();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].destination.node_id(), NodeId::new(3));
    }

    #[test]
    fn unreachable_node_sends_nothing() {
        let mut node = present_node(4);
        node.neighbors.add_potential(contact(2));
        node.interface_down();
        assert!(node.run_maintenance().is_empty());
        // budgets are still sized
        assert!(node.admission().is_initialized());

        node.interface_up();
        assert_eq!(node.run_maintenance().len(), 1);
    }

    #[test]
    fn single_slot_degree_may_send_nothing() {
        // D = 1 and NullRandom::zeros: the only slot is inbound
        let mut node = present_node(1);
        node.neighbors.extend_potential((2..200).map(contact));
        assert!(node.run_maintenance().is_empty());
        assert_eq!(node.admission().attempts_remaining(), 100);
    }

    #[test]
    fn rejections_consume_attempts_until_exhausted() {
        let mut node = present_node(2);
        node.neighbors.extend_potential((2..250).map(contact));
        let mut pending = node.run_maintenance();
        assert_eq!(pending.len(), 1);

        let mut sent = 1;
        while let Some(request) = pending.pop() {
            let peer = request.destination.node_id();
            let reply = ConnectPeersReply {
                sender: request.destination,
                accepted: false,
            };
            if let Some(next) = node.on_connect_reply(peer, Ok(reply.into())).unwrap() {
                sent += 1;
                pending.push(next);
            }
        }

        assert_eq!(sent, 200);
        assert_eq!(node.admission().attempts_remaining(), 0);
        assert!(!node.admission().has_attempts());
        assert_eq!(node.admission().outbound_available(), 1);
        assert!(node.run_maintenance().is_empty());
    }
}
