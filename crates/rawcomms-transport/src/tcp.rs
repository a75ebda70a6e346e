use std::fmt::Display;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Blocking TCP listener/connector. Accepted and connected streams have
/// `TCP_NODELAY` set.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (`127.0.0.1:0` picks a free port).
    pub fn bind(addr: impl ToSocketAddrs + Display) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::bind(&addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Connect to a listening peer (blocking).
    pub fn connect(addr: impl ToSocketAddrs + Display) -> Result<TcpStream> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::connect(&addr, e))?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected over tcp");
        Ok(stream)
    }

    /// Connect to a single resolved address, giving up after `timeout`.
    pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| TransportError::connect(addr, e))?;
        stream.set_nodelay(true)?;
        debug!(%addr, ?timeout, "connected over tcp");
        Ok(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
