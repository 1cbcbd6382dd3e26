use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Reasons a CA64 frame is rejected by the host-side decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame truncated: {len} bytes")]
    Truncated { len: usize },
    #[error("missing CA64 header")]
    BadHeader,
    #[error("unexpected payload length {0}")]
    BadLength(u16),
    #[error("CRC mismatch (received {received:#06X}, computed {computed:#06X})")]
    Crc { received: u16, computed: u16 },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
