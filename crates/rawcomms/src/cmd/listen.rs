use std::io;

use rawcomms_frame::{FrameError, FrameReader};
use rawcomms_transport::TcpTransport;

use crate::cmd::{frame_config, install_shutdown, receive_timeout, ListenArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_transmission, OutputFormat};

/// What a receive loop should do after a failed read.
pub(crate) enum RecvOutcome {
    /// Peer closed the connection; accept the next one.
    Disconnected,
    /// The peer sent something unusable; drop its connection and keep serving.
    Dropped(FrameError),
    /// No transmission arrived within the receive timeout.
    Expired(FrameError),
    /// Ctrl-C; stop serving.
    Shutdown,
}

pub(crate) fn classify_recv_error(err: FrameError) -> RecvOutcome {
    match err {
        FrameError::Io(ref source) if is_hangup(source) => RecvOutcome::Disconnected,
        FrameError::Cancelled { .. } => RecvOutcome::Shutdown,
        FrameError::Timeout { .. } => RecvOutcome::Expired(err),
        other => RecvOutcome::Dropped(other),
    }
}

fn is_hangup(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = receive_timeout(args.timeout.as_deref())?;
    let config = frame_config(args.lenient);
    let listener = TcpTransport::bind(args.addr.as_str()).map_err(|err| transport_error("bind failed", err))?;
    let shutdown = install_shutdown(listener.local_addr())?;

    let mut printed = 0usize;

    while !shutdown.is_cancelled() {
        let (stream, peer) = listener.accept().map_err(|err| transport_error("accept failed", err))?;
        if shutdown.is_cancelled() {
            break;
        }

        let mut reader = FrameReader::with_config(stream, config.clone());
        loop {
            let transmission = match reader.read_transmission_deadline(timeout, &shutdown) {
                Ok(t) => t,
                Err(err) => match classify_recv_error(err) {
                    RecvOutcome::Disconnected => {
                        tracing::debug!(%peer, "peer disconnected");
                        break;
                    }
                    RecvOutcome::Dropped(err) => {
                        tracing::warn!(%peer, error = %err, "dropping connection");
                        break;
                    }
                    RecvOutcome::Expired(err) => return Err(frame_error("receive failed", err)),
                    RecvOutcome::Shutdown => return Ok(SUCCESS),
                },
            };

            print_transmission(&transmission, peer, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}
