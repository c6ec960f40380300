//! Overlay networking layer for flood.
//!
//! Admission budgets, neighbor bookkeeping, presence notification, the tracker's registry, and the
//! transport seam (with an in-process implementation) used by the node.

pub mod admission;
pub mod budget;
pub mod error;
pub mod local;
pub mod neighbors;
pub mod presence;
pub mod registry;
pub mod transport;

pub use admission::{AdmissionController, LinkDirection};
pub use budget::Budget;
pub use error::NetworkError;
pub use local::{LocalNetwork, LocalTransport};
pub use neighbors::{Link, NeighborTable};
pub use presence::{PresenceListener, PresenceNotifier};
pub use registry::TrackerRegistry;
pub use transport::{Delivery, Inbox, RequestId, Transport, TransportBinder};
