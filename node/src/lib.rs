//! Flood overlay node.
//!
//! A peer discovers candidate neighbors through the tracker, then negotiates
//! a bounded number of overlay links under inbound, outbound and attempt
//! budgets. This crate holds:
//! - Per-node settings and the overlay context / node factory
//! - The peer protocol core (join, ConnectPeers exchange, maintenance)
//! - The bootstrap tracker
//! - A tokio actor runtime and an in-process overlay harness

pub mod context;
pub mod error;
pub mod join;
pub mod maintenance;
pub mod peer;
pub mod runtime;
pub mod settings;
pub mod shutdown;
pub mod tracing_spans;
pub mod tracker;

pub use context::{endpoint_for, NodeFactory, OverlayContext, OVERLAY_PORT};
pub use error::NodeError;
pub use join::{retry_delay, JoinOutcome};
pub use peer::{AttemptOutcome, NodeSnapshot, OutboundRequest, OverlayNode};
pub use runtime::{spawn_peer, spawn_tracker, Overlay, PeerCommand, PeerHandle, TrackerHandle};
pub use settings::{Param, Settings, TimeSetting};
pub use shutdown::ShutdownController;
pub use tracker::Tracker;
