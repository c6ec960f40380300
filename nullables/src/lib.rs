//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies of the overlay (transport, randomness, presence
//! listeners) sit behind traits. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch a runtime or the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod network;
pub mod presence;
pub mod random;

pub use network::{NullTransport, SentMessage};
pub use presence::RecordingListener;
pub use random::NullRandom;
