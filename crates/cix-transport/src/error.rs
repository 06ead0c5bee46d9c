/// Errors raised by the TCP transport.
///
/// Address-carrying variants keep the `host:port` text as given by the
/// caller so diagnostics show what was asked for, not what it resolved to.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be created on `addr`.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// No resolved address for `addr` accepted the connection.
    #[error("cannot reach {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// `accept` on the listening socket failed.
    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    /// Socket option or stream-level failure on an open connection.
    #[error("tcp stream error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
