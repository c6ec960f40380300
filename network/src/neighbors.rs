//! Potential and connected neighbor sets of a single overlay node.
//!
//! Both sets are keyed by [`NodeId`] in ordered maps so that iteration, and
//! therefore seeded random selection, is reproducible.

use std::collections::BTreeMap;

use flood_types::{Contact, NodeId};
use rand::Rng;

use crate::admission::LinkDirection;

/// An established overlay link.
#[derive(Clone, Debug)]
pub struct Link {
    pub contact: Contact,
    pub direction: LinkDirection,
}

/// Candidate and connected neighbors of one node.
///
/// The local node never appears in either set, and a contact is never in
/// both at once.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    local: NodeId,
    potential: BTreeMap<NodeId, Contact>,
    connected: BTreeMap<NodeId, Link>,
}

impl NeighborTable {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            potential: BTreeMap::new(),
            connected: BTreeMap::new(),
        }
    }

    // -- Potential neighbors ---------------------------------------------------

    /// Add a candidate. Ignores the local node and already connected peers.
    /// Returns `true` if the candidate was new.
    pub fn add_potential(&mut self, contact: Contact) -> bool {
        let id = contact.node_id();
        if id == self.local || self.connected.contains_key(&id) {
            return false;
        }
        self.potential.insert(id, contact).is_none()
    }

    /// Add many candidates, returning how many were new.
    pub fn extend_potential<I: IntoIterator<Item = Contact>>(&mut self, contacts: I) -> usize {
        contacts
            .into_iter()
            .filter(|c| self.add_potential(c.clone()))
            .count()
    }

    /// Remove and return a uniformly random candidate.
    pub fn take_random_potential<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Contact> {
        if self.potential.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.potential.len());
        let id = *self.potential.keys().nth(index)?;
        self.potential.remove(&id)
    }

    /// Drop every candidate that is already connected. Returns how many were
    /// dropped.
    pub fn purge_connected(&mut self) -> usize {
        let before = self.potential.len();
        let connected = &self.connected;
        self.potential.retain(|id, _| !connected.contains_key(id));
        before - self.potential.len()
    }

    pub fn contains_potential(&self, id: &NodeId) -> bool {
        self.potential.contains_key(id)
    }

    pub fn potential_len(&self) -> usize {
        self.potential.len()
    }

    pub fn potential_contacts(&self) -> Vec<Contact> {
        self.potential.values().cloned().collect()
    }

    pub fn potential_ids(&self) -> Vec<NodeId> {
        self.potential.keys().copied().collect()
    }

    // -- Connected neighbors ---------------------------------------------------

    /// Record an established link. A contact already connected keeps its
    /// original link; returns `true` only if the link is new.
    pub fn connect(&mut self, contact: Contact, direction: LinkDirection) -> bool {
        let id = contact.node_id();
        if id == self.local || self.connected.contains_key(&id) {
            return false;
        }
        self.potential.remove(&id);
        self.connected.insert(id, Link { contact, direction });
        true
    }

    /// Forget a link, returning it if it existed.
    pub fn disconnect(&mut self, id: &NodeId) -> Option<Link> {
        self.connected.remove(id)
    }

    pub fn is_connected(&self, id: &NodeId) -> bool {
        self.connected.contains_key(id)
    }

    pub fn connected_len(&self) -> usize {
        self.connected.len()
    }

    pub fn connected_contacts(&self) -> Vec<Contact> {
        self.connected.values().map(|l| l.contact.clone()).collect()
    }

    pub fn connected_ids(&self) -> Vec<NodeId> {
        self.connected.keys().copied().collect()
    }

    pub fn iter_connected(&self) -> impl Iterator<Item = &Link> {
        self.connected.values()
    }

    pub fn local(&self) -> NodeId {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flood_types::Endpoint;
    use rand::rngs::mock::StepRng;
    use std::net::{IpAddr, Ipv4Addr};

    fn contact(id: u64) -> Contact {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, id as u8));
        Contact::peer(NodeId::new(id), Endpoint::new(ip, 6666))
    }

    #[test]
    fn local_node_is_never_added() {
        let mut table = NeighborTable::new(NodeId::new(1));
        assert!(!table.add_potential(contact(1)));
        assert!(!table.connect(contact(1), LinkDirection::Inbound));
        assert_eq!(table.potential_len(), 0);
        assert_eq!(table.connected_len(), 0);
    }

    #[test]
    fn connecting_removes_from_potential() {
        let mut table = NeighborTable::new(NodeId::new(0));
        table.add_potential(contact(2));
        assert!(table.connect(contact(2), LinkDirection::Outbound));
        assert!(!table.contains_potential(&NodeId::new(2)));
        assert!(!table.add_potential(contact(2)));
    }

    #[test]
    fn duplicate_connect_is_a_set_union() {
        let mut table = NeighborTable::new(NodeId::new(0));
        assert!(table.connect(contact(3), LinkDirection::Inbound));
        assert!(!table.connect(contact(3), LinkDirection::Outbound));
        assert_eq!(table.connected_len(), 1);
        let link = table.iter_connected().next().unwrap();
        assert_eq!(link.direction, LinkDirection::Inbound);
    }

    #[test]
    fn take_random_removes_the_choice() {
        let mut table = NeighborTable::new(NodeId::new(0));
        assert_eq!(table.extend_potential((1..=3).map(contact)), 3);

        // StepRng(0) always picks the lowest index.
        let mut rng = StepRng::new(0, 0);
        assert_eq!(table.take_random_potential(&mut rng), Some(contact(1)));
        assert_eq!(table.potential_len(), 2);
        assert_eq!(table.take_random_potential(&mut rng), Some(contact(2)));
        assert_eq!(table.take_random_potential(&mut rng), Some(contact(3)));
        assert_eq!(table.take_random_potential(&mut rng), None);
    }

    #[test]
    fn purge_drops_connected_candidates() {
        let mut table = NeighborTable::new(NodeId::new(0));
        table.extend_potential([contact(1), contact(2)]);
        // Bypass the insert-time filter to model a link made after the
        // candidate was learned.
        table.connected.insert(
            NodeId::new(1),
            Link {
                contact: contact(1),
                direction: LinkDirection::Inbound,
            },
        );
        assert_eq!(table.purge_connected(), 1);
        assert_eq!(table.potential_contacts(), vec![contact(2)]);
    }

    #[test]
    fn disconnect_returns_the_link() {
        let mut table = NeighborTable::new(NodeId::new(0));
        table.connect(contact(4), LinkDirection::Outbound);
        let link = table.disconnect(&NodeId::new(4)).unwrap();
        assert_eq!(link.direction, LinkDirection::Outbound);
        assert!(table.disconnect(&NodeId::new(4)).is_none());
    }
}
