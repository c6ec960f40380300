//! Contact records: identity plus the endpoints a peer or tracker listens on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::network::{Endpoint, InterfaceName};
use crate::node_id::NodeId;

/// Whether a contact describes a regular peer or the bootstrap tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactRole {
    Peer,
    Tracker,
}

impl fmt::Display for ContactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer => f.write_str("PEER"),
            Self::Tracker => f.write_str("TRACKER"),
        }
    }
}

/// Identity and endpoints of an overlay participant.
///
/// Equality, ordering and hashing consider the [`NodeId`] only; two contacts
/// for the same node with different endpoint maps compare equal.
#[derive(Clone, Serialize, Deserialize)]
pub struct Contact {
    node_id: NodeId,
    role: ContactRole,
    endpoints: BTreeMap<InterfaceName, Endpoint>,
    /// Cached [`Contact::transmission_size`], reset on every endpoint change.
    #[serde(skip)]
    cached_size: OnceLock<usize>,
}

impl Contact {
    /// A contact without any endpoint yet.
    pub fn new(node_id: NodeId, role: ContactRole) -> Self {
        Self {
            node_id,
            role,
            endpoints: BTreeMap::new(),
            cached_size: OnceLock::new(),
        }
    }

    /// A peer contact reachable through a single ethernet endpoint.
    pub fn peer(node_id: NodeId, endpoint: Endpoint) -> Self {
        Self::new(node_id, ContactRole::Peer).with_endpoint(InterfaceName::Ethernet, endpoint)
    }

    /// A tracker contact reachable through a single ethernet endpoint.
    pub fn tracker(node_id: NodeId, endpoint: Endpoint) -> Self {
        Self::new(node_id, ContactRole::Tracker).with_endpoint(InterfaceName::Ethernet, endpoint)
    }

    /// Builder-style [`Contact::add_endpoint`].
    pub fn with_endpoint(mut self, interface: InterfaceName, endpoint: Endpoint) -> Self {
        self.add_endpoint(interface, endpoint);
        self
    }

    /// Set the endpoint for `interface`, replacing any existing one.
    pub fn add_endpoint(&mut self, interface: InterfaceName, endpoint: Endpoint) -> &mut Self {
        self.endpoints.insert(interface, endpoint);
        self.cached_size = OnceLock::new();
        self
    }

    /// Drop the endpoint registered for `interface`, if any.
    pub fn remove_endpoint(&mut self, interface: InterfaceName) -> &mut Self {
        self.endpoints.remove(&interface);
        self.cached_size = OnceLock::new();
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn role(&self) -> ContactRole {
        self.role
    }

    pub fn is_tracker(&self) -> bool {
        self.role == ContactRole::Tracker
    }

    pub fn endpoint(&self, interface: InterfaceName) -> Option<&Endpoint> {
        self.endpoints.get(&interface)
    }

    /// The first registered endpoint (in interface order), if any.
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.values().next()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (&InterfaceName, &Endpoint)> {
        self.endpoints.iter()
    }

    /// Estimated bytes needed to transmit this contact: the node id plus
    /// every endpoint.
    pub fn transmission_size(&self) -> usize {
        *self.cached_size.get_or_init(|| {
            NodeId::TRANSMISSION_SIZE
                + self
                    .endpoints
                    .values()
                    .map(Endpoint::transmission_size)
                    .sum::<usize>()
        })
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for Contact {}

impl PartialOrd for Contact {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Contact {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.node_id.cmp(&other.node_id)
    }
}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

impl fmt::Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contact")
            .field("node_id", &self.node_id)
            .field("role", &self.role)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.node_id, self.role)?;
        if let Some(endpoint) = self.primary_endpoint() {
            write!(f, " net: {endpoint}")?;
        }
        Ok(())
    }
}
