//! Length-prefixed transmission framing for raw byte streams.
//!
//! Every transmission on the wire is:
//! - A 2-byte big-endian metadata length
//! - An 8-byte big-endian length of the base64 payload text
//! - The metadata block (opaque bytes, usually JSON)
//! - The payload, base64 encoded with padding
//!
//! Blocking reads and writes can be bounded by a timeout and a
//! [`CancellationToken`]; see [`deadline`].

#[cfg(feature = "async")]
pub mod async_io;
pub mod codec;
pub mod deadline;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_io::{
    decode_with_deadline_async, decode_with_timeout_async, encode_with_deadline_async,
    encode_with_timeout_async, read_transmission_async, write_transmission_async,
    TransmissionCodec,
};
pub use codec::{
    decode_transmission, encode_transmission, FrameConfig, FrameHeader, Transmission,
    TruncationPolicy, DEFAULT_CHUNK_SIZE, HEADER_SIZE, MAX_METADATA_SIZE,
};
pub use deadline::{decode_with_deadline, decode_with_timeout, encode_with_deadline, encode_with_timeout};
pub use error::{Direction, FrameError, Result};
pub use metadata::{Header, StatusMessage};
pub use reader::{decode, FrameReader};
pub use tokio_util::sync::CancellationToken;
pub use writer::{encode, encode_json, FrameWriter};
