//! Tracker-side registry of every peer that ever joined.
//!
//! The registry only grows: departed peers are not removed.

use std::collections::BTreeMap;

use flood_types::{Contact, NodeId};
use rand::seq::SliceRandom;
use rand::Rng;

/// Contacts known to the tracker.
#[derive(Clone, Debug, Default)]
pub struct TrackerRegistry {
    known: BTreeMap<NodeId, Contact>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a joining peer. Returns `true` if it was not known yet. A
    /// re-joining peer's contact replaces the stored one.
    pub fn register(&mut self, contact: Contact) -> bool {
        self.known.insert(contact.node_id(), contact).is_none()
    }

    /// Pick the initial neighborhood for `requester`: every other known
    /// contact if there are at most `max` of them, otherwise a uniformly
    /// random subset of size `max`.
    pub fn initial_neighbors_for<R: Rng + ?Sized>(
        &self,
        requester: &NodeId,
        max: usize,
        rng: &mut R,
    ) -> Vec<Contact> {
        let mut candidates: Vec<Contact> = self
            .known
            .iter()
            .filter(|(id, _)| *id != requester)
            .map(|(_, c)| c.clone())
            .collect();

        if candidates.len() <= max {
            return candidates;
        }

        candidates.shuffle(rng);
        candidates.truncate(max);
        candidates
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.known.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
