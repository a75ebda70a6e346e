//! Stream capabilities and TCP plumbing for rawcomms.
//!
//! The framing layer only needs a connected byte stream. The deadline-bound
//! operations additionally need to push a timeout into the blocking read or
//! write itself, which is what [`DeadlineStream`] describes.
//!
//! [`TcpTransport`] is a thin listener/connector used by the CLI and tests.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::DeadlineStream;
