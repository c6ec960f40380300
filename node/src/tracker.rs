//! The bootstrap tracker.
//!
//! Registers every joining peer for good and answers with a random subset of
//! the other peers it knows, capped at `MAX_NUM_NEW_NEIGHBORS`.

use rand::RngCore;

use flood_messages::{JoinReply, JoinRequest, OverlayMessage};
use flood_network::TrackerRegistry;
use flood_types::{Contact, NodeId};

use crate::settings::Settings;
use crate::NodeError;

pub struct Tracker {
    contact: Contact,
    settings: Settings,
    registry: TrackerRegistry,
    rng: Box<dyn RngCore + Send>,
}

impl Tracker {
    pub fn new(contact: Contact, settings: Settings, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            contact,
            settings,
            registry: TrackerRegistry::new(),
            rng,
        }
    }

    pub fn id(&self) -> NodeId {
        self.contact.node_id()
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    /// Register the requester and pick its initial neighborhood.
    pub fn on_join_request(&mut self, request: JoinRequest) -> JoinReply {
        let requester = request.sender.node_id();
        let is_new = self.registry.register(request.sender);
        let neighbors = self.registry.initial_neighbors_for(
            &requester,
            self.settings.max_num_new_neighbors(),
            &mut *self.rng,
        );
        tracing::debug!(
            tracker = %self.id(),
            %requester,
            is_new,
            known = self.registry.len(),
            returned = neighbors.len(),
            "join request handled"
        );
        JoinReply {
            sender: self.contact.clone(),
            neighbors,
        }
    }

    /// Handle any message addressed to the tracker. Only join requests are
    /// valid.
    pub fn handle(&mut self, message: OverlayMessage) -> Result<JoinReply, NodeError> {
        match message {
            OverlayMessage::JoinRequest(request) => Ok(self.on_join_request(request)),
            other => Err(NodeError::ProtocolViolation(format!(
                "tracker {} received {} from {}",
                self.id(),
                other.kind(),
                other.sender().node_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Param;
    use flood_nullables::NullRandom;
    use flood_types::Endpoint;
    use std::net::{IpAddr, Ipv4Addr};

    fn contact(id: u64) -> Contact {
        Contact::peer(
            NodeId::new(id),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, id as u8)), 6666),
        )
    }

    fn tracker(max_new: u64) -> Tracker {
        Tracker::new(
            Contact::tracker(NodeId::new(0), Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6666)),
            Settings::default().with_param(Param::MaxNumNewNeighbors, max_new),
            Box::new(NullRandom::new(vec![7, 3, 11, 5])),
        )
    }

    fn join(tracker: &mut Tracker, id: u64) -> Vec<NodeId> {
        tracker
            .on_join_request(JoinRequest { sender: contact(id) })
            .neighbors
            .iter()
            .map(Contact::node_id)
            .collect()
    }

    #[test]
    fn first_joiner_gets_empty_reply() {
        let mut tracker = tracker(10);
        assert!(join(&mut tracker, 1).is_empty());
        assert!(tracker.registry().contains(&NodeId::new(1)));
    }

    #[test]
    fn reply_never_contains_requester() {
        let mut tracker = tracker(10);
        for id in 1..=5 {
            join(&mut tracker, id);
        }
        let reply = join(&mut tracker, 3);
        assert_eq!(reply.len(), 4);
        assert!(!reply.contains(&NodeId::new(3)));
        // re-joining does not grow the registry
        assert_eq!(tracker.registry().len(), 5);
    }

    #[test]
    fn reply_is_capped() {
        let mut tracker = tracker(3);
        for id in 1..=20 {
            join(&mut tracker, id);
        }
        let reply = join(&mut tracker, 21);
        assert_eq!(reply.len(), 3);
        assert!(!reply.contains(&NodeId::new(21)));
    }

    #[test]
    fn reply_carries_tracker_contact() {
        let mut tracker = tracker(3);
        let reply = tracker.on_join_request(JoinRequest { sender: contact(1) });
        assert!(reply.sender.is_tracker());
        assert_eq!(reply.sender.node_id(), NodeId::new(0));
    }

    #[test]
    fn other_messages_are_protocol_violations() {
        let mut tracker = tracker(3);
        let message = flood_messages::ConnectPeersRequest {
            sender: contact(1),
            neighbors: None,
        };
        let err = tracker.handle(message.into()).unwrap_err();
        assert!(matches!(err, NodeError::ProtocolViolation(_)));
        assert!(tracker.registry().is_empty());
    }
}
