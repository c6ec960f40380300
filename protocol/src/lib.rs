//! Wire protocol: message framing, encoding/decoding, versioning.

pub mod codec;
pub mod error;
pub mod version;

pub use codec::{decode, encode, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use version::PROTOCOL_VERSION;
