use std::io::{self, ErrorKind, Read};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rawcomms_transport::DeadlineStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{
    FrameConfig, FrameHeader, Transmission, TruncationPolicy, HEADER_SIZE, INITIAL_PAYLOAD_CAPACITY,
};
use crate::deadline;
use crate::error::{Direction, FrameError, Result};

/// Reads complete transmissions from any `Read` stream.
///
/// Each call consumes exactly one frame; nothing is buffered past it.
pub struct FrameReader<T> {
    inner: T,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            chunk: vec![0u8; config.chunk_size.max(1)],
            config,
        }
    }

    /// Read the next complete transmission (blocking).
    pub fn read_transmission(&mut self) -> Result<Transmission> {
        read_from(&mut self.inner, &mut self.chunk, &self.config)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read + DeadlineStream> FrameReader<T> {
    /// Read the next transmission, giving up once `timeout` has elapsed.
    pub fn read_transmission_timeout(&mut self, timeout: Duration) -> Result<Transmission> {
        self.read_transmission_bounded(timeout, None)
    }

    /// Read the next transmission, giving up once `timeout` has elapsed or
    /// `cancel` fires.
    pub fn read_transmission_deadline(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Transmission> {
        self.read_transmission_bounded(timeout, Some(cancel))
    }

    fn read_transmission_bounded(
        &mut self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Transmission> {
        let Self {
            inner,
            chunk,
            config,
        } = self;
        deadline::run(
            Direction::Recv,
            timeout,
            cancel,
            config.cancel_poll_interval,
            inner,
            |io| read_from(io, chunk, config),
        )
    }
}

/// Decode one transmission from `stream` using the default configuration.
pub fn decode<R: Read>(stream: &mut R) -> Result<Transmission> {
    FrameReader::new(stream).read_transmission()
}

fn read_from<R: Read>(src: &mut R, chunk: &mut [u8], config: &FrameConfig) -> Result<Transmission> {
    let mut raw = [0u8; HEADER_SIZE];
    src.read_exact(&mut raw)?;
    let header = FrameHeader::from_bytes(&raw);

    let metadata = if header.metadata_size > 0 {
        let mut block = vec![0u8; usize::from(header.metadata_size)];
        src.read_exact(&mut block)?;
        Bytes::from(block)
    } else {
        Bytes::new()
    };

    if header.payload_size == 0 {
        debug!(metadata_size = header.metadata_size, "received transmission without payload");
        return Transmission::from_wire(header, metadata, &[], config.trim_metadata_padding);
    }

    let expected = config.check_payload_size(header.payload_size)?;
    let encoded = read_payload_text(src, chunk, expected, config.truncation)?;

    debug!(
        metadata_size = header.metadata_size,
        payload_size = header.payload_size,
        received = encoded.len(),
        "received transmission"
    );
    Transmission::from_wire(header, metadata, &encoded, config.trim_metadata_padding)
}

/// Read the base64 payload block in chunk-sized pieces, never past `expected`.
fn read_payload_text<R: Read>(
    src: &mut R,
    chunk: &mut [u8],
    expected: usize,
    truncation: TruncationPolicy,
) -> Result<BytesMut> {
    let mut text = BytesMut::with_capacity(expected.min(INITIAL_PAYLOAD_CAPACITY));

    while text.len() < expected {
        let want = (expected - text.len()).min(chunk.len());
        let read = match src.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(err) if is_transient(&err) => continue,
            Err(err) => return Err(FrameError::Io(err)),
        };

        if read == 0 {
            match truncation {
                TruncationPolicy::Strict => {
                    return Err(FrameError::TruncatedPayload {
                        expected: expected as u64,
                        received: text.len() as u64,
                    });
                }
                TruncationPolicy::Lenient => {
                    warn!(
                        expected,
                        received = text.len(),
                        "stream ended inside payload block; decoding what arrived"
                    );
                    break;
                }
            }
        }

        text.extend_from_slice(&chunk[..read]);
    }

    Ok(text)
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
