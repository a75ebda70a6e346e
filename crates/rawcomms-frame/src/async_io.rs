//! Tokio integration: a `tokio_util` codec plus async read/write helpers.
//!
//! The deadline variants race the I/O future against a timer and the
//! cancellation token; whichever loses is dropped.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{
    decode_transmission, decode_truncated, encode_transmission, encoded_payload_len, FrameConfig,
    FrameHeader, Transmission, TruncationPolicy, HEADER_SIZE, INITIAL_PAYLOAD_CAPACITY,
};
use crate::error::{Direction, FrameError, Result};

/// Frames transmissions over an async byte stream with
/// `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Default)]
pub struct TransmissionCodec {
    config: FrameConfig,
}

impl TransmissionCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for TransmissionCodec {
    type Item = Transmission;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_transmission(src, &self.config)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(t) = self.decode(src)? {
            return Ok(Some(t));
        }
        if src.is_empty() {
            return Ok(None);
        }
        decode_truncated(src, &self.config).map(Some)
    }
}

impl Encoder<Transmission> for TransmissionCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Transmission, dst: &mut BytesMut) -> Result<()> {
        encode_checked(&item.payload, &item.metadata, &self.config, dst)?;
        Ok(())
    }
}

fn encode_checked(payload: &[u8], metadata: &[u8], config: &FrameConfig, dst: &mut BytesMut) -> Result<usize> {
    let encoded_len = encoded_payload_len(payload.len())?;
    if encoded_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: encoded_len,
            max: config.max_payload_size,
        });
    }
    encode_transmission(payload, metadata, dst)
}

/// Read one transmission from an async stream.
pub async fn read_transmission_async<R>(reader: &mut R, config: &FrameConfig) -> Result<Transmission>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    reader.read_exact(&mut raw).await?;
    let header = FrameHeader::from_bytes(&raw);

    let metadata = if header.metadata_size > 0 {
        let mut block = vec![0u8; usize::from(header.metadata_size)];
        reader.read_exact(&mut block).await?;
        Bytes::from(block)
    } else {
        Bytes::new()
    };

    if header.payload_size == 0 {
        return Transmission::from_wire(header, metadata, &[], config.trim_metadata_padding);
    }

    let expected = config.check_payload_size(header.payload_size)?;
    let mut encoded = Vec::with_capacity(expected.min(INITIAL_PAYLOAD_CAPACITY));
    let mut chunk = vec![0u8; config.chunk_size.max(1)];

    while encoded.len() < expected {
        let want = (expected - encoded.len()).min(chunk.len());
        match reader.read(&mut chunk[..want]).await {
            Ok(0) => match config.truncation {
                TruncationPolicy::Strict => {
                    return Err(FrameError::TruncatedPayload {
                        expected: header.payload_size,
                        received: encoded.len() as u64,
                    })
                }
                TruncationPolicy::Lenient => {
                    warn!(
                        expected = header.payload_size,
                        received = encoded.len(),
                        "stream ended inside payload block"
                    );
                    break;
                }
            },
            Ok(n) => encoded.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }

    debug!(
        metadata_size = header.metadata_size,
        payload_size = header.payload_size,
        received = encoded.len(),
        "received transmission"
    );
    Transmission::from_wire(header, metadata, &encoded, config.trim_metadata_padding)
}

/// Write one transmission to an async stream. Returns the bytes written.
pub async fn write_transmission_async<W>(
    writer: &mut W,
    payload: &[u8],
    metadata: &[u8],
    config: &FrameConfig,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    encode_checked(payload, metadata, config, &mut buf)?;
    write_encoded(writer, &buf).await
}

async fn write_encoded<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> Result<usize> {
    writer.write_all(buf).await?;
    writer.flush().await?;
    debug!(bytes = buf.len(), "sent transmission");
    Ok(buf.len())
}

pub async fn decode_with_timeout_async<R>(timeout: Duration, reader: &mut R) -> Result<Transmission>
where
    R: AsyncRead + Unpin,
{
    let config = FrameConfig::default();
    bounded(Direction::Recv, timeout, None, read_transmission_async(reader, &config)).await
}

pub async fn decode_with_deadline_async<R>(
    timeout: Duration,
    cancel: &CancellationToken,
    reader: &mut R,
) -> Result<Transmission>
where
    R: AsyncRead + Unpin,
{
    let config = FrameConfig::default();
    bounded(Direction::Recv, timeout, Some(cancel), read_transmission_async(reader, &config)).await
}

pub async fn encode_with_timeout_async<W>(
    timeout: Duration,
    writer: &mut W,
    payload: &[u8],
    metadata: impl AsRef<[u8]>,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    encode_checked(payload, metadata.as_ref(), &FrameConfig::default(), &mut buf)?;
    bounded(Direction::Send, timeout, None, write_encoded(writer, &buf)).await
}

pub async fn encode_with_deadline_async<W>(
    timeout: Duration,
    cancel: &CancellationToken,
    writer: &mut W,
    payload: &[u8],
    metadata: impl AsRef<[u8]>,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    encode_checked(payload, metadata.as_ref(), &FrameConfig::default(), &mut buf)?;
    bounded(Direction::Send, timeout, Some(cancel), write_encoded(writer, &buf)).await
}

async fn bounded<T, F>(
    direction: Direction,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
    op: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return Err(FrameError::InvalidTimeout);
    }
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(FrameError::Cancelled { direction });
    }

    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        result = op => result,
        _ = cancelled => Err(FrameError::Cancelled { direction }),
        _ = tokio::time::sleep(timeout) => Err(FrameError::Timeout { direction, timeout }),
    }
}
