//! Message codec: framing and serialization for the wire protocol.
//!
//! A frame is a 4-byte big-endian body length followed by the bincode
//! encoding of `(protocol_version, message)`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::version::{is_compatible, PROTOCOL_VERSION};
use crate::ProtocolError;

/// Maximum message body size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MiB

const LENGTH_PREFIX: usize = 4;

#[derive(Serialize)]
struct FrameRef<'a, T> {
    version: u16,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Frame<T> {
    version: u16,
    payload: T,
}

/// Encode a message for transmission (length-prefixed bincode).
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = bincode::serialize(&FrameRef {
        version: PROTOCOL_VERSION,
        payload: message,
    })
    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a message from a complete frame.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < LENGTH_PREFIX {
        return Err(ProtocolError::Truncated {
            expected: LENGTH_PREFIX,
            actual: data.len(),
        });
    }
    let (prefix, body) = data.split_at(LENGTH_PREFIX);
    let mut len_buf = [0u8; LENGTH_PREFIX];
    len_buf.copy_from_slice(prefix);
    let body_len = u32::from_be_bytes(len_buf) as usize;

    if body_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body_len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if body.len() < body_len {
        return Err(ProtocolError::Truncated {
            expected: body_len,
            actual: body.len(),
        });
    }

    let frame: Frame<T> = bincode::deserialize(&body[..body_len])
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if !is_compatible(frame.version) {
        return Err(ProtocolError::UnsupportedVersion(frame.version));
    }
    Ok(frame.payload)
}
