//! Minimal echo server: accepts one peer and echoes transmissions back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7400 \
//!     --data hello --agent demo --wait --timeout 3s

use std::time::Duration;

use rawcomms::frame::{decode_with_deadline, encode_with_timeout, CancellationToken, FrameError};
use rawcomms::transport::TcpTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpTransport::bind("127.0.0.1:7400")?;
    eprintln!("Listening on {}", listener.local_addr());

    let (mut stream, peer) = listener.accept()?;
    eprintln!("Peer connected: {peer}");

    // Nothing cancels this token; a real server would hand it to a signal handler.
    let cancel = CancellationToken::new();
    let idle = Duration::from_secs(30);

    loop {
        match decode_with_deadline(idle, &cancel, &mut stream) {
            Ok(t) => {
                eprintln!(
                    "Received {} payload bytes, metadata {:?}",
                    t.payload.len(),
                    t.metadata_str().unwrap_or("<binary>")
                );
                encode_with_timeout(Duration::from_secs(5), &mut stream, &t.payload, &t.metadata)?;
            }
            Err(FrameError::Timeout { .. }) => {
                eprintln!("Peer idle for {idle:?}, closing");
                break;
            }
            Err(e) => {
                eprintln!("Peer disconnected: {e}");
                break;
            }
        }
    }

    Ok(())
}
