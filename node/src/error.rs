use flood_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] flood_network::NetworkError),

    #[error("config error: {0}")]
    Config(String),

    #[error("no tracker configured for this overlay")]
    NoTracker,

    #[error("overlay already has tracker {0}")]
    DuplicateTracker(NodeId),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("node {0} has stopped")]
    Stopped(NodeId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
