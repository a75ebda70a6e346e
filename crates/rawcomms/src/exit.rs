use std::fmt;
use std::io;

use rawcomms_frame::FrameError;
use rawcomms_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => FAILURE,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match err.io().kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::Io(source) => return io_error(context, source),
        FrameError::Timeout { .. } => TIMEOUT,
        FrameError::Cancelled { .. } => FAILURE,
        FrameError::InvalidTimeout => USAGE,
        FrameError::MetadataTooLarge { .. }
        | FrameError::PayloadTooLarge { .. }
        | FrameError::Decode(_)
        | FrameError::TruncatedPayload { .. }
        | FrameError::Metadata(_) => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rawcomms_frame::Direction;

    use super::*;

    #[test]
    fn frame_errors_map_to_exit_codes() {
        let timeout = FrameError::Timeout {
            direction: Direction::Recv,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(frame_error("receive failed", timeout).code, TIMEOUT);

        let truncated = FrameError::TruncatedPayload {
            expected: 24,
            received: 8,
        };
        assert_eq!(frame_error("receive failed", truncated).code, DATA_INVALID);

        assert_eq!(frame_error("send failed", FrameError::InvalidTimeout).code, USAGE);
    }

    #[test]
    fn peer_hangup_is_a_plain_failure() {
        let err = FrameError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let cli = frame_error("receive failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("receive failed: "));
    }

    #[test]
    fn refused_connect_is_a_transport_error() {
        let err = TransportError::Io(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(transport_error("connect failed", err).code, TRANSPORT_ERROR);
    }
}
