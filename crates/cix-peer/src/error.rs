use std::path::PathBuf;

use cix_frame::{Command, FrameError};

use crate::status::WireErrorKind;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] cix_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The server answered with NAK or ERROR.
    #[error("sent {request}, server returned {response}: {kind}")]
    Rejected {
        request: Command,
        response: Command,
        kind: WireErrorKind,
    },

    /// The server answered with a tag that does not belong to this exchange.
    #[error("sent {request}, server returned unexpected {response}")]
    UnexpectedResponse { request: Command, response: Command },

    /// A local file could not be read or written.
    #[error("{}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PeerError {
    /// Whether the connection is unusable after this error.
    ///
    /// Rejections, unexpected responses, local file errors and errors caught
    /// before anything was sent leave the stream at a packet boundary.
    pub fn is_fatal(&self) -> bool {
        match self {
            PeerError::Transport(_) => true,
            PeerError::Frame(err) => matches!(
                err,
                FrameError::Io(_) | FrameError::ConnectionClosed | FrameError::UnknownCommand(_)
            ),
            PeerError::Rejected { .. }
            | PeerError::UnexpectedResponse { .. }
            | PeerError::LocalIo { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
