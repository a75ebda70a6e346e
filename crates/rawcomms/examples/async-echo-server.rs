//! Async echo server on tokio, one task per connection.
//!
//! Run with:
//!   cargo run --example async-echo-server --features async

use std::time::Duration;

use rawcomms::frame::{decode_with_timeout_async, write_transmission_async, FrameConfig, FrameError};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:7401").await?;
    eprintln!("Listening on {}", listener.local_addr()?);

    loop {
        let (mut stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let config = FrameConfig::default();
            loop {
                let t = match decode_with_timeout_async(Duration::from_secs(30), &mut stream).await {
                    Ok(t) => t,
                    Err(FrameError::Timeout { .. }) => {
                        eprintln!("{peer}: idle, closing");
                        return;
                    }
                    Err(e) => {
                        eprintln!("{peer}: {e}");
                        return;
                    }
                };
                if let Err(e) = write_transmission_async(&mut stream, &t.payload, &t.metadata, &config).await {
                    eprintln!("{peer}: echo failed: {e}");
                    return;
                }
            }
        });
    }
}
