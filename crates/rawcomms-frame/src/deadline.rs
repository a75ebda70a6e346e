//! Deadline- and cancellation-bound send/receive.
//!
//! The timeout is pushed into the blocking I/O itself: before every read or
//! write the stream's OS timeout is set to whatever is left of the deadline,
//! capped at [`FrameConfig::cancel_poll_interval`]. A call therefore returns
//! within one poll slice of the deadline or of cancellation, even when the
//! peer goes silent halfway through a frame.
//!
//! [`FrameConfig::cancel_poll_interval`]: crate::codec::FrameConfig::cancel_poll_interval

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use rawcomms_transport::DeadlineStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::Transmission;
use crate::error::{Direction, FrameError, Result};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// OS socket timeouts reject zero, so a slice never goes below this.
const MIN_SLICE: Duration = Duration::from_millis(1);

/// Stand-in expiry for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Receive one transmission, failing with [`FrameError::Timeout`] once
/// `timeout` has elapsed.
pub fn decode_with_timeout<S>(timeout: Duration, stream: &mut S) -> Result<Transmission>
where
    S: Read + DeadlineStream,
{
    FrameReader::new(stream).read_transmission_timeout(timeout)
}

/// Receive one transmission, bounded by `timeout` and by `cancel`.
pub fn decode_with_deadline<S>(
    timeout: Duration,
    cancel: &CancellationToken,
    stream: &mut S,
) -> Result<Transmission>
where
    S: Read + DeadlineStream,
{
    FrameReader::new(stream).read_transmission_deadline(timeout, cancel)
}

/// Send one transmission, failing with [`FrameError::Timeout`] once
/// `timeout` has elapsed. Returns the number of bytes written.
pub fn encode_with_timeout<S>(
    timeout: Duration,
    stream: &mut S,
    payload: &[u8],
    metadata: impl AsRef<[u8]>,
) -> Result<usize>
where
    S: Write + DeadlineStream,
{
    FrameWriter::new(stream).send_timeout(timeout, payload, metadata.as_ref())
}

/// Send one transmission, bounded by `timeout` and by `cancel`.
pub fn encode_with_deadline<S>(
    timeout: Duration,
    cancel: &CancellationToken,
    stream: &mut S,
    payload: &[u8],
    metadata: impl AsRef<[u8]>,
) -> Result<usize>
where
    S: Write + DeadlineStream,
{
    FrameWriter::new(stream).send_deadline(timeout, cancel, payload, metadata.as_ref())
}

/// Why a bounded read/write stopped early. Travels inside an `io::Error` so
/// the codec propagates it like any other hard I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Expired,
    Cancelled,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Expired => f.write_str("deadline expired"),
            Interrupt::Cancelled => f.write_str("operation cancelled"),
        }
    }
}

impl std::error::Error for Interrupt {}

struct Deadline<'a> {
    expires_at: Instant,
    slice: Duration,
    cancel: Option<&'a CancellationToken>,
}

impl Deadline<'_> {
    /// How long the next blocking call may take, or why it must not start.
    fn next_slice(&self) -> io::Result<Duration> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(io::Error::other(Interrupt::Cancelled));
        }
        let remaining = self.expires_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::other(Interrupt::Expired));
        }
        Ok(remaining.min(self.slice))
    }
}

/// A stream borrowed for the duration of one bounded operation.
///
/// Restores the stream's previous timeout for its direction on drop.
pub(crate) struct DeadlineIo<'a, S: DeadlineStream> {
    stream: &'a mut S,
    deadline: Deadline<'a>,
    direction: Direction,
    previous: Option<Duration>,
    armed: Option<Duration>,
}

impl<'a, S: DeadlineStream> DeadlineIo<'a, S> {
    fn new(stream: &'a mut S, direction: Direction, deadline: Deadline<'a>) -> io::Result<Self> {
        let previous = match direction {
            Direction::Recv => stream.read_timeout()?,
            Direction::Send => stream.write_timeout()?,
        };
        Ok(Self {
            stream,
            deadline,
            direction,
            previous,
            armed: None,
        })
    }

    /// Set the OS timeout for the next blocking call.
    fn arm(&mut self) -> io::Result<()> {
        let slice = self.deadline.next_slice()?;
        if self.armed == Some(slice) {
            return Ok(());
        }
        match self.direction {
            Direction::Recv => self.stream.set_read_timeout(Some(slice))?,
            Direction::Send => self.stream.set_write_timeout(Some(slice))?,
        }
        self.armed = Some(slice);
        Ok(())
    }
}

impl<S: DeadlineStream + Read> Read for DeadlineIo<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.arm()?;
            match self.stream.read(buf) {
                Err(err) if slice_elapsed(&err) => continue,
                result => return result,
            }
        }
    }
}

impl<S: DeadlineStream + Write> Write for DeadlineIo<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            self.arm()?;
            match self.stream.write(buf) {
                Err(err) if slice_elapsed(&err) => continue,
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            self.arm()?;
            match self.stream.flush() {
                Err(err) if slice_elapsed(&err) => continue,
                result => return result,
            }
        }
    }
}

impl<S: DeadlineStream> Drop for DeadlineIo<'_, S> {
    fn drop(&mut self) {
        let restored = match self.direction {
            Direction::Recv => self.stream.set_read_timeout(self.previous),
            Direction::Send => self.stream.set_write_timeout(self.previous),
        };
        if let Err(err) = restored {
            debug!(error = %err, direction = %self.direction, "failed to restore stream timeout");
        }
    }
}

fn slice_elapsed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Run `op` against `stream` under a deadline, translating an interrupted
/// read/write into [`FrameError::Timeout`] or [`FrameError::Cancelled`].
pub(crate) fn run<'a, S, R, F>(
    direction: Direction,
    timeout: Duration,
    cancel: Option<&'a CancellationToken>,
    poll_interval: Duration,
    stream: &'a mut S,
    op: F,
) -> Result<R>
where
    S: DeadlineStream,
    F: FnOnce(&mut DeadlineIo<'a, S>) -> Result<R>,
{
    if timeout.is_zero() {
        return Err(FrameError::InvalidTimeout);
    }
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(FrameError::Cancelled { direction });
    }

    let now = Instant::now();
    let deadline = Deadline {
        expires_at: now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE),
        slice: poll_interval.max(MIN_SLICE),
        cancel,
    };

    let mut io = DeadlineIo::new(stream, direction, deadline)?;
    let result = op(&mut io);
    drop(io);

    result.map_err(|err| classify(err, direction, timeout))
}

fn classify(err: FrameError, direction: Direction, timeout: Duration) -> FrameError {
    match err {
        FrameError::Io(io) => match interrupt_of(&io) {
            Some(Interrupt::Expired) => {
                debug!(%direction, ?timeout, "deadline expired");
                FrameError::Timeout { direction, timeout }
            }
            Some(Interrupt::Cancelled) => {
                debug!(%direction, "operation cancelled");
                FrameError::Cancelled { direction }
            }
            None => FrameError::Io(io),
        },
        other => other,
    }
}

fn interrupt_of(err: &io::Error) -> Option<Interrupt> {
    err.get_ref()?.downcast_ref::<Interrupt>().copied()
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;
    use crate::reader::decode;
    use crate::writer::encode;

    /// Any use of the stream fails the test.
    struct UntouchableStream;

    impl Read for UntouchableStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("stream must not be read");
        }
    }

    impl Write for UntouchableStream {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("stream must not be written");
        }

        fn flush(&mut self) -> io::Result<()> {
            panic!("stream must not be flushed");
        }
    }

    impl DeadlineStream for UntouchableStream {
        fn read_timeout(&self) -> io::Result<Option<Duration>> {
            panic!("timeouts must not be queried");
        }

        fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            panic!("timeouts must not be set");
        }

        fn write_timeout(&self) -> io::Result<Option<Duration>> {
            panic!("timeouts must not be queried");
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            panic!("timeouts must not be set");
        }
    }

    fn frame(payload: &[u8], metadata: &[u8]) -> Vec<u8> {
        let mut wire = Cursor::new(Vec::new());
        encode(&mut wire, payload, metadata).unwrap();
        wire.into_inner()
    }

    #[test]
    fn zero_timeout_rejected_without_touching_stream() {
        let mut stream = UntouchableStream;

        let err = decode_with_timeout(Duration::ZERO, &mut stream).unwrap_err();
        assert!(matches!(err, FrameError::InvalidTimeout));

        let err = encode_with_timeout(Duration::ZERO, &mut stream, b"x", "md").unwrap_err();
        assert!(matches!(err, FrameError::InvalidTimeout));
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let mut stream = UntouchableStream;
        let token = CancellationToken::new();
        token.cancel();

        let err = decode_with_deadline(Duration::from_secs(5), &token, &mut stream).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Cancelled {
                direction: Direction::Recv
            }
        ));

        let err = encode_with_deadline(Duration::from_secs(5), &token, &mut stream, b"x", "")
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Cancelled {
                direction: Direction::Send
            }
        ));
    }

    #[test]
    fn one_nanosecond_timeout_returns_promptly() {
        let (mut silent, _peer) = UnixStream::pair().unwrap();

        let start = Instant::now();
        let err = decode_with_timeout(Duration::from_nanos(1), &mut silent).unwrap_err();

        assert!(matches!(
            err,
            FrameError::Timeout {
                direction: Direction::Recv,
                ..
            }
        ));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn timeout_bounds_a_blocked_read() {
        let (mut silent, _peer) = UnixStream::pair().unwrap();

        let start = Instant::now();
        let err = decode_with_timeout(Duration::from_millis(120), &mut silent).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, FrameError::Timeout { timeout, .. } if timeout == Duration::from_millis(120)));
        assert!(elapsed >= Duration::from_millis(100), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "overran deadline: {elapsed:?}");
    }

    #[test]
    fn timeout_fires_mid_frame() {
        let (mut reader, mut peer) = UnixStream::pair().unwrap();
        let bytes = frame(b"never finished", b"m");
        peer.write_all(&bytes[..bytes.len() - 3]).unwrap();

        let start = Instant::now();
        let err = decode_with_timeout(Duration::from_millis(80), &mut reader).unwrap_err();
        assert!(matches!(err, FrameError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn completes_before_deadline() {
        let (mut reader, mut peer) = UnixStream::pair().unwrap();
        peer.write_all(&frame(b"on time", b"{\"code\":0}")).unwrap();

        let t = decode_with_timeout(Duration::from_secs(5), &mut reader).unwrap();
        assert_eq!(t.payload.as_ref(), b"on time");
        assert_eq!(t.metadata.as_ref(), b"{\"code\":0}");
    }

    #[test]
    fn slow_peer_spanning_several_slices() {
        let (mut reader, mut peer) = UnixStream::pair().unwrap();
        let bytes = frame(b"trickled payload", b"meta");

        let writer = thread::spawn(move || {
            for piece in bytes.chunks(7) {
                peer.write_all(piece).unwrap();
                thread::sleep(Duration::from_millis(15));
            }
            peer
        });

        let cancel = CancellationToken::new();
        let mut framed = FrameReader::with_config(
            &mut reader,
            crate::codec::FrameConfig {
                cancel_poll_interval: Duration::from_millis(5),
                ..Default::default()
            },
        );
        let t = framed
            .read_transmission_deadline(Duration::from_secs(5), &cancel)
            .unwrap();
        assert_eq!(t.payload.as_ref(), b"trickled payload");
        assert_eq!(t.metadata.as_ref(), b"meta");

        let _peer = writer.join().unwrap();
    }

    #[test]
    fn cancellation_interrupts_blocked_read() {
        let (mut silent, _peer) = UnixStream::pair().unwrap();
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                token.cancel();
            })
        };

        let start = Instant::now();
        let err = decode_with_deadline(Duration::from_secs(30), &token, &mut silent).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Cancelled {
                direction: Direction::Recv
            }
        ));
        assert!(start.elapsed() < Duration::from_secs(5));

        canceller.join().unwrap();
    }

    #[test]
    fn previous_read_timeout_restored() {
        let (mut silent, _peer) = UnixStream::pair().unwrap();
        silent
            .set_read_timeout(Some(Duration::from_secs(7)))
            .unwrap();

        let _ = decode_with_timeout(Duration::from_millis(10), &mut silent);
        assert_eq!(silent.read_timeout().unwrap(), Some(Duration::from_secs(7)));

        silent.set_read_timeout(None).unwrap();
        let _ = decode_with_timeout(Duration::from_millis(10), &mut silent);
        assert_eq!(silent.read_timeout().unwrap(), None);
    }

    #[test]
    fn io_errors_pass_through_unchanged() {
        let (mut reader, peer) = UnixStream::pair().unwrap();
        drop(peer);

        let err = decode_with_timeout(Duration::from_secs(5), &mut reader).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn codec_errors_pass_through_unchanged() {
        let (mut reader, mut peer) = UnixStream::pair().unwrap();
        peer.write_all(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 4]).unwrap();
        peer.write_all(b"@@@@").unwrap();

        let err = decode_with_timeout(Duration::from_secs(5), &mut reader).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn encode_with_timeout_roundtrip() {
        let (mut left, mut right) = UnixStream::pair().unwrap();

        let written =
            encode_with_timeout(Duration::from_secs(5), &mut left, b"bounded", "{\"endpoint\":7}")
                .unwrap();
        assert_eq!(written, 10 + 14 + 12);

        let t = decode(&mut right).unwrap();
        assert_eq!(t.payload.as_ref(), b"bounded");
        assert_eq!(t.metadata.as_ref(), b"{\"endpoint\":7}");
    }

    #[test]
    fn encode_times_out_when_peer_stops_reading() {
        let (mut left, _right) = UnixStream::pair().unwrap();
        left.set_write_timeout(Some(Duration::from_secs(9))).unwrap();
        let payload = vec![0x5A; 8 * 1024 * 1024];

        let start = Instant::now();
        let err =
            encode_with_timeout(Duration::from_millis(100), &mut left, &payload, "").unwrap_err();

        assert!(matches!(
            err,
            FrameError::Timeout {
                direction: Direction::Send,
                ..
            }
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(left.write_timeout().unwrap(), Some(Duration::from_secs(9)));
    }

    #[test]
    fn encode_rejects_oversized_metadata_before_touching_stream() {
        let mut stream = UntouchableStream;
        let metadata = vec![b'm'; crate::codec::MAX_METADATA_SIZE + 1];

        let err =
            encode_with_timeout(Duration::from_secs(1), &mut stream, b"x", &metadata).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MetadataTooLarge {
                size: 65_536,
                max: 65_535
            }
        ));
    }
}
