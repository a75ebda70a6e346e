use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Width of the metadata length field (u16, big-endian).
pub const METADATA_SIZE_FIELD: usize = 2;

/// Width of the encoded payload length field (u64, big-endian).
pub const PAYLOAD_SIZE_FIELD: usize = 8;

/// Frame header: metadata length (2) + payload length (8) = 10 bytes.
pub const HEADER_SIZE: usize = METADATA_SIZE_FIELD + PAYLOAD_SIZE_FIELD;

/// Largest metadata block the 16-bit length field can describe.
pub const MAX_METADATA_SIZE: usize = u16::MAX as usize;

/// Default payload read chunk: 2 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024;

/// Padding byte some senders append to short metadata blocks.
pub const NULL_BYTE: u8 = 0x00;

/// Cap on any allocation sized from a peer-declared length. Larger blocks
/// grow only as their bytes actually arrive.
pub(crate) const INITIAL_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Default upper bound for one blocking slice of a deadline-bound call.
pub const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One decoded unit of communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Metadata block length as transmitted (before padding was trimmed).
    pub metadata_size: u16,
    /// Encoded (base64) payload length as transmitted.
    pub payload_size: u64,
    /// Metadata block with trailing NUL padding removed.
    pub metadata: Bytes,
    /// Decoded payload.
    pub payload: Bytes,
}

impl Transmission {
    /// Build an outgoing transmission, validating the metadata length.
    pub fn new(payload: impl Into<Bytes>, metadata: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let metadata = metadata.into();
        let metadata_size = metadata_len(&metadata)?;
        let payload_size = encoded_payload_len(payload.len())?;
        Ok(Self {
            metadata_size,
            payload_size,
            metadata,
            payload,
        })
    }

    /// The metadata as UTF-8 text, if it is valid UTF-8.
    pub fn metadata_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.metadata).ok()
    }

    /// Total size of this transmission on the wire.
    pub fn wire_size(&self) -> u64 {
        HEADER_SIZE as u64 + u64::from(self.metadata_size) + self.payload_size
    }

    /// Assemble a received transmission from its raw blocks.
    pub(crate) fn from_wire(
        header: FrameHeader,
        metadata: Bytes,
        encoded_payload: &[u8],
        trim_padding: bool,
    ) -> Result<Self> {
        let metadata = if trim_padding {
            let keep = trim_metadata_padding(&metadata).len();
            metadata.slice(..keep)
        } else {
            metadata
        };

        let payload = if encoded_payload.is_empty() {
            Bytes::new()
        } else {
            Bytes::from(STANDARD.decode(encoded_payload)?)
        };

        Ok(Self {
            metadata_size: header.metadata_size,
            payload_size: header.payload_size,
            metadata,
            payload,
        })
    }
}

/// The fixed 10-byte frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub metadata_size: u16,
    pub payload_size: u64,
}

impl FrameHeader {
    pub fn from_bytes(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut md = [0u8; METADATA_SIZE_FIELD];
        let mut pl = [0u8; PAYLOAD_SIZE_FIELD];
        md.copy_from_slice(&raw[..METADATA_SIZE_FIELD]);
        pl.copy_from_slice(&raw[METADATA_SIZE_FIELD..]);
        Self {
            metadata_size: u16::from_be_bytes(md),
            payload_size: u64::from_be_bytes(pl),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..METADATA_SIZE_FIELD].copy_from_slice(&self.metadata_size.to_be_bytes());
        raw[METADATA_SIZE_FIELD..].copy_from_slice(&self.payload_size.to_be_bytes());
        raw
    }
}

/// What to do when the stream ends before the declared payload length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Fail with [`FrameError::TruncatedPayload`].
    #[default]
    Strict,
    /// Stop reading and decode whatever arrived.
    Lenient,
}

/// Configuration for the transmission codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Payload read chunk size in bytes. Default: 2 KiB.
    pub chunk_size: usize,
    /// Maximum declared encoded payload size. Default: unbounded.
    pub max_payload_size: u64,
    /// Behaviour on early end-of-stream inside the payload block.
    pub truncation: TruncationPolicy,
    /// Strip trailing NUL bytes from received metadata. Default: true.
    ///
    /// Metadata whose content really ends in NUL does not survive trimming;
    /// set this to `false` when received metadata must match what was sent
    /// byte for byte.
    pub trim_metadata_padding: bool,
    /// Longest single blocking read/write under a deadline.
    pub cancel_poll_interval: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload_size: u64::MAX,
            truncation: TruncationPolicy::Strict,
            trim_metadata_padding: true,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
        }
    }
}

impl FrameConfig {
    /// Reject a declared payload size that exceeds the configured maximum
    /// or cannot be addressed on this platform.
    pub(crate) fn check_payload_size(&self, declared: u64) -> Result<usize> {
        let max = self.max_payload_size.min(usize::MAX as u64);
        if declared > max {
            return Err(FrameError::PayloadTooLarge {
                size: declared,
                max,
            });
        }
        Ok(declared as usize)
    }
}

/// Strip trailing NUL padding from a metadata block.
///
/// Leading and interior NUL bytes are kept.
pub fn trim_metadata_padding(block: &[u8]) -> &[u8] {
    let end = block
        .iter()
        .rposition(|&b| b != NULL_BYTE)
        .map_or(0, |idx| idx + 1);
    &block[..end]
}

/// Length of the base64 text for a payload of `raw_len` bytes.
pub fn encoded_payload_len(raw_len: usize) -> Result<u64> {
    base64::encoded_len(raw_len, true)
        .map(|len| len as u64)
        .ok_or(FrameError::PayloadTooLarge {
            size: raw_len as u64,
            max: usize::MAX as u64,
        })
}

fn metadata_len(metadata: &[u8]) -> Result<u16> {
    u16::try_from(metadata.len()).map_err(|_| FrameError::MetadataTooLarge {
        size: metadata.len(),
        max: MAX_METADATA_SIZE,
    })
}

/// Encode a transmission into the wire format, appending to `dst`.
///
/// Returns the number of bytes appended. Nothing is appended when the
/// metadata is too large.
///
/// Wire format:
/// ```text
/// ┌────────────────┬────────────────┬──────────────┬──────────────────┐
/// │ Metadata len   │ Payload len    │ Metadata     │ Payload          │
/// │ (2B BE, u16)   │ (8B BE, u64)   │ (N bytes)    │ (M bytes base64) │
/// └────────────────┴────────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_transmission(payload: &[u8], metadata: &[u8], dst: &mut BytesMut) -> Result<usize> {
    let metadata_size = metadata_len(metadata)?;
    let encoded = STANDARD.encode(payload);

    let total = HEADER_SIZE + metadata.len() + encoded.len();
    dst.reserve(total);
    dst.put_u16(metadata_size);
    dst.put_u64(encoded.len() as u64);
    dst.put_slice(metadata);
    dst.put_slice(encoded.as_bytes());
    Ok(total)
}

/// Decode a transmission from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly one frame from the buffer.
pub fn decode_transmission(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Transmission>> {
    let Some((header, payload_len)) = peek_header(src, config)? else {
        return Ok(None);
    };

    let metadata_len = usize::from(header.metadata_size);
    let total = (HEADER_SIZE + metadata_len)
        .checked_add(payload_len)
        .ok_or(FrameError::PayloadTooLarge {
            size: header.payload_size,
            max: (usize::MAX - HEADER_SIZE - metadata_len) as u64,
        })?;
    if src.len() < total {
        src.reserve((total - src.len()).min(INITIAL_PAYLOAD_CAPACITY));
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let metadata = src.split_to(metadata_len).freeze();
    let encoded = src.split_to(payload_len);

    Transmission::from_wire(header, metadata, &encoded, config.trim_metadata_padding).map(Some)
}

/// Decode whatever remains of a frame once the stream has ended.
///
/// A frame whose header or metadata is cut short is an `UnexpectedEof` I/O
/// error. A short payload block follows the configured [`TruncationPolicy`].
pub fn decode_truncated(src: &mut BytesMut, config: &FrameConfig) -> Result<Transmission> {
    let Some((header, payload_len)) = peek_header(src, config)? else {
        return Err(unexpected_eof("stream ended inside frame header"));
    };

    let metadata_len = usize::from(header.metadata_size);
    if src.len() < HEADER_SIZE + metadata_len {
        return Err(unexpected_eof("stream ended inside metadata block"));
    }

    let received = src.len() - HEADER_SIZE - metadata_len;
    if received < payload_len {
        if config.truncation == TruncationPolicy::Strict {
            return Err(FrameError::TruncatedPayload {
                expected: header.payload_size,
                received: received as u64,
            });
        }
        tracing::warn!(
            expected = header.payload_size,
            received,
            "decoding truncated payload"
        );
    }

    src.advance(HEADER_SIZE);
    let metadata = src.split_to(metadata_len).freeze();
    let encoded = src.split_to(received.min(payload_len));

    Transmission::from_wire(header, metadata, &encoded, config.trim_metadata_padding)
}

fn peek_header(src: &BytesMut, config: &FrameConfig) -> Result<Option<(FrameHeader, usize)>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let header = FrameHeader::from_bytes(&raw);
    let payload_len = config.check_payload_size(header.payload_size)?;
    Ok(Some((header, payload_len)))
}

pub(crate) fn unexpected_eof(msg: &'static str) -> FrameError {
    FrameError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, msg))
}
