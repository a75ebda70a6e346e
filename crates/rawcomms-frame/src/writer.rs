use std::io::{self, ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use rawcomms_transport::DeadlineStream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{encode_transmission, encoded_payload_len, FrameConfig, Transmission};
use crate::deadline;
use crate::error::{Direction, FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete transmissions to any `Write` stream.
///
/// The whole frame is assembled in one buffer and handed to the stream as a
/// single logical write.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send a payload with its metadata (blocking).
    ///
    /// Returns the number of bytes written to the stream.
    pub fn send(&mut self, payload: &[u8], metadata: &[u8]) -> Result<usize> {
        self.prepare(payload, metadata)?;
        write_buffer(&mut self.inner, &self.buf)
    }

    /// Send a payload with a serialized record as its metadata.
    pub fn send_json<M: Serialize + ?Sized>(&mut self, payload: &[u8], metadata: &M) -> Result<usize> {
        let metadata = serde_json::to_vec(metadata)?;
        self.send(payload, &metadata)
    }

    /// Write a complete transmission (blocking).
    pub fn write_transmission(&mut self, transmission: &Transmission) -> Result<usize> {
        self.send(&transmission.payload, &transmission.metadata)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        flush_stream(&mut self.inner)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Validate and encode into the internal buffer. Touches no stream.
    fn prepare(&mut self, payload: &[u8], metadata: &[u8]) -> Result<()> {
        let encoded_len = encoded_payload_len(payload.len())?;
        if encoded_len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: encoded_len,
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_transmission(payload, metadata, &mut self.buf)?;
        Ok(())
    }
}

impl<T: Write + DeadlineStream> FrameWriter<T> {
    /// Send a transmission, giving up once `timeout` has elapsed.
    pub fn send_timeout(&mut self, timeout: Duration, payload: &[u8], metadata: &[u8]) -> Result<usize> {
        self.send_bounded(timeout, None, payload, metadata)
    }

    /// Send a transmission, giving up once `timeout` has elapsed or `cancel`
    /// fires.
    pub fn send_deadline(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
        payload: &[u8],
        metadata: &[u8],
    ) -> Result<usize> {
        self.send_bounded(timeout, Some(cancel), payload, metadata)
    }

    fn send_bounded(
        &mut self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
        payload: &[u8],
        metadata: &[u8],
    ) -> Result<usize> {
        self.prepare(payload, metadata)?;

        let Self { inner, buf, config } = self;
        deadline::run(
            Direction::Send,
            timeout,
            cancel,
            config.cancel_poll_interval,
            inner,
            |io| write_buffer(io, buf),
        )
    }
}

/// Encode one transmission onto `stream`. Returns the number of bytes written.
pub fn encode<W: Write>(stream: &mut W, payload: &[u8], metadata: impl AsRef<[u8]>) -> Result<usize> {
    FrameWriter::new(stream).send(payload, metadata.as_ref())
}

/// Encode one transmission whose metadata is `metadata` serialized as JSON.
pub fn encode_json<W: Write, M: Serialize + ?Sized>(
    stream: &mut W,
    payload: &[u8],
    metadata: &M,
) -> Result<usize> {
    FrameWriter::new(stream).send_json(payload, metadata)
}

fn write_buffer<W: Write>(dst: &mut W, buf: &[u8]) -> Result<usize> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match dst.write(&buf[offset..]) {
            Ok(0) => {
                return Err(FrameError::Io(io::Error::new(
                    ErrorKind::WriteZero,
                    "stream accepted no bytes",
                )))
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }

    flush_stream(dst)?;
    debug!(bytes = offset, "sent transmission");
    Ok(offset)
}

fn flush_stream<W: Write>(dst: &mut W) -> Result<()> {
    loop {
        match dst.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}
