use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::CixStream;

/// TCP listening transport.
///
/// Provides bind/accept on the server side and connect on the client side.
/// The listen backlog is the platform default.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `host:port`.
    ///
    /// Port 0 asks the OS for an ephemeral port; see [`TcpTransport::local_addr`].
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port)).map_err(|e| TransportError::Bind {
            addr: addr.clone(),
            source: e,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Bind { addr, source: e })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    ///
    /// Errors, including `Interrupted`, are returned as-is; the caller
    /// decides which ones are worth retrying.
    pub fn accept(&self) -> Result<(CixStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(peer = %addr, "accepted connection");
        Ok((CixStream::from_tcp(stream), addr))
    }

    /// Connect to a listening server (blocking).
    ///
    /// `host` is resolved with the system resolver; every resolved address is
    /// tried in turn.
    pub fn connect(host: &str, port: u16) -> Result<CixStream> {
        let stream = TcpStream::connect((host, port)).map_err(|e| TransportError::Connect {
            addr: format!("{host}:{port}"),
            source: e,
        })?;
        debug!(host, port, "connected to tcp socket");
        Ok(CixStream::from_tcp(stream))
    }

    /// Connect to an already-resolved socket address.
    pub fn connect_addr(addr: SocketAddr) -> Result<CixStream> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(%addr, "connected to tcp socket");
        Ok(CixStream::from_tcp(stream))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
