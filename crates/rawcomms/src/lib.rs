//! Framed transmissions over raw byte streams.
//!
//! A transmission is a metadata block (usually JSON) plus a base64-encoded
//! payload, each preceded by a big-endian length. Reads and writes can be
//! bounded by a timeout and cancelled from another thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP binding and the socket-timeout seam used by deadlines
//! - [`frame`]: the transmission codec, deadline wrapper and typed metadata
//!
//! ```no_run
//! use std::time::Duration;
//! use rawcomms::frame::{decode_with_timeout, encode};
//! use rawcomms::transport::TcpTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = TcpTransport::connect("127.0.0.1:7400")?;
//! encode(&mut stream, b"hello", r#"{"agentname":"demo","endpoint":1,"addldata":""}"#)?;
//! let reply = decode_with_timeout(Duration::from_secs(5), &mut stream)?;
//! println!("{:?}", reply.payload);
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use rawcomms_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rawcomms_frame::*;
}
