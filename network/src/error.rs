use flood_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("node {0} is not reachable")]
    Unreachable(NodeId),

    #[error("node {0} is already bound")]
    AlreadyBound(NodeId),

    #[error("no reply within {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("endpoint of node {0} is closed")]
    Closed(NodeId),

    #[error("protocol error: {0}")]
    Protocol(#[from] flood_protocol::ProtocolError),
}
