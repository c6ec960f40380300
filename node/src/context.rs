//! Overlay-wide wiring: which tracker peers bootstrap from, and a factory
//! handing out node identities, settings and random sources.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use flood_network::{Inbox, TransportBinder};
use flood_types::{Contact, ContactRole, Endpoint, InterfaceName, NodeId};

use crate::peer::OverlayNode;
use crate::settings::Settings;
use crate::tracker::Tracker;
use crate::NodeError;

/// Port every generated contact listens on.
pub const OVERLAY_PORT: u16 = 6666;

/// Tracker reference plus a registry of created nodes.
///
/// The node registry is bookkeeping for harnesses; protocol code never
/// consults it.
#[derive(Clone, Debug, Default)]
pub struct OverlayContext {
    tracker: Option<Contact>,
    nodes: BTreeMap<NodeId, Contact>,
}

impl OverlayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context bootstrapping from a statically configured tracker.
    pub fn with_tracker(tracker: Contact) -> Self {
        Self {
            tracker: Some(tracker),
            nodes: BTreeMap::new(),
        }
    }

    /// Install the overlay's tracker. There can only be one.
    pub fn set_tracker(&mut self, tracker: Contact) -> Result<(), NodeError> {
        if let Some(existing) = &self.tracker {
            return Err(NodeError::DuplicateTracker(existing.node_id()));
        }
        self.tracker = Some(tracker);
        Ok(())
    }

    /// The tracker peers join through.
    pub fn tracker(&self) -> Result<&Contact, NodeError> {
        self.tracker.as_ref().ok_or(NodeError::NoTracker)
    }

    pub fn register_node(&mut self, contact: Contact) {
        self.nodes.insert(contact.node_id(), contact);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Contact> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Ethernet endpoint derived from a node id.
pub fn endpoint_for(id: NodeId) -> Endpoint {
    let [.., a, b, c] = id.as_u64().to_be_bytes();
    Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, a, b, c)), OVERLAY_PORT)
}

/// Creates trackers and peers for one overlay.
///
/// Every node gets its own clone of the settings and its own random source,
/// seeded from the factory seed and the node id so runs are reproducible.
pub struct NodeFactory {
    context: OverlayContext,
    settings: Settings,
    seed: u64,
    next_id: u64,
}

impl NodeFactory {
    pub fn new(settings: Settings, seed: u64) -> Self {
        Self::with_context(OverlayContext::new(), settings, seed)
    }

    pub fn with_context(context: OverlayContext, settings: Settings, seed: u64) -> Self {
        let next_id = context
            .tracker
            .iter()
            .chain(context.nodes.values())
            .map(|c| c.node_id().as_u64() + 1)
            .max()
            .unwrap_or(0);
        Self {
            context,
            settings,
            seed,
            next_id,
        }
    }

    pub fn context(&self) -> &OverlayContext {
        &self.context
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings handed to nodes created from now on.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn next_contact(&mut self, role: ContactRole) -> Contact {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        Contact::new(id, role).with_endpoint(InterfaceName::Ethernet, endpoint_for(id))
    }

    fn rng_for(&self, id: NodeId) -> Box<dyn RngCore + Send> {
        let seed = self.seed ^ id.as_u64().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Box::new(StdRng::seed_from_u64(seed))
    }

    /// Create the overlay's tracker.
    pub fn create_tracker(&mut self) -> Result<Tracker, NodeError> {
        if let Ok(existing) = self.context.tracker() {
            return Err(NodeError::DuplicateTracker(existing.node_id()));
        }
        let contact = self.next_contact(ContactRole::Tracker);
        self.context.set_tracker(contact.clone())?;
        tracing::info!(tracker = %contact.node_id(), "tracker created");
        let rng = self.rng_for(contact.node_id());
        Ok(Tracker::new(contact, self.settings.clone(), rng))
    }

    /// Create a peer bound through `binder`. Fails with
    /// [`NodeError::NoTracker`] if the overlay has no tracker yet.
    pub fn create_peer<B: TransportBinder>(
        &mut self,
        binder: &B,
    ) -> Result<(OverlayNode<B::Transport>, Inbox), NodeError> {
        let tracker = self.context.tracker()?.clone();
        let contact = self.next_contact(ContactRole::Peer);
        let (transport, inbox) = binder.bind(&contact)?;
        self.context.register_node(contact.clone());
        let rng = self.rng_for(contact.node_id());
        let node = OverlayNode::new(
            contact,
            tracker,
            self.settings.clone(),
            Arc::new(transport),
            rng,
        );
        Ok((node, inbox))
    }
}
