use rawcomms_frame::{encode_with_deadline, FrameError, FrameReader};
use rawcomms_transport::TcpTransport;

use crate::cmd::listen::{classify_recv_error, RecvOutcome};
use crate::cmd::{frame_config, install_shutdown, receive_timeout, EchoArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let timeout = receive_timeout(args.timeout.as_deref())?;
    let config = frame_config(args.lenient);
    let listener = TcpTransport::bind(args.addr.as_str()).map_err(|err| transport_error("bind failed", err))?;
    let shutdown = install_shutdown(listener.local_addr())?;

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
                    RecvOutcome::Expired(err) => {
                        tracing::warn!(%peer, error = %err, "peer idle, closing connection");
                        break;
                    }
                    RecvOutcome::Dropped(err) => {
                        tracing::warn!(%peer, error = %err, "dropping connection");
                        break;
                    }
                    RecvOutcome::Shutdown => return Ok(SUCCESS),
                },
            };

            tracing::info!(
                %peer,
                metadata_size = transmission.metadata.len(),
                size = transmission.payload.len(),
                "echoing transmission"
            );

            match encode_with_deadline(
                timeout,
                &shutdown,
                reader.get_mut(),
                &transmission.payload,
                &transmission.metadata,
            ) {
                Ok(_) => {}
                Err(FrameError::Cancelled { .. }) => return Ok(SUCCESS),
                Err(err) => {
                    tracing::warn!(%peer, error = %err, "echo send failed, dropping connection");
                    break;
                }
            }
        }
    }

    Ok(SUCCESS)
}
