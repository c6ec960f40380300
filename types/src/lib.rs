//! Fundamental types for the flood overlay.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: node identities, network endpoints, contacts and the overlay
//! membership state.

pub mod contact;
pub mod network;
pub mod node_id;
pub mod state;

pub use contact::{Contact, ContactRole};
pub use network::{Endpoint, InterfaceName};
pub use node_id::NodeId;
pub use state::PeerStatus;
