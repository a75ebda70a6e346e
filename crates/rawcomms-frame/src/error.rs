use std::fmt;
use std::time::Duration;

/// Which half of the exchange a deadline-bound operation was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Receiving a transmission.
    Recv,
    /// Sending a transmission.
    Send,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Recv => f.write_str("read"),
            Direction::Send => f.write_str("send"),
        }
    }
}

/// Errors that can occur during transmission encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A deadline-bound call was given a zero timeout.
    #[error("timeout must be > 0")]
    InvalidTimeout,

    /// The metadata does not fit the 16-bit length field.
    #[error("metadata size of {size} bytes is too large. max size is {max} bytes")]
    MetadataTooLarge { size: usize, max: usize },

    /// The declared encoded payload exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    /// An I/O error occurred while reading or writing the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload block is not valid base64.
    #[error("payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The stream ended before the declared payload length was read.
    #[error("truncated payload ({received} of {expected} encoded bytes)")]
    TruncatedPayload { expected: u64, received: u64 },

    /// The metadata block could not be (de)serialized as JSON.
    #[error("metadata JSON error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The deadline elapsed before the operation completed.
    #[error("{direction} transmission timeout after {timeout:?}")]
    Timeout {
        direction: Direction,
        timeout: Duration,
    },

    /// The operation was cancelled before it completed.
    #[error("{direction} has been cancelled")]
    Cancelled { direction: Direction },
}

impl FrameError {
    /// True for the two deadline outcomes (`Timeout`, `Cancelled`).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, FrameError::Timeout { .. } | FrameError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
