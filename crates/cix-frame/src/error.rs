/// Errors that can occur while framing packets or coding headers.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header carries a command tag outside the known set.
    ///
    /// The full header has been consumed when this is returned, so the
    /// stream is still positioned at the next packet boundary.
    #[error("unknown command tag {0}")]
    UnknownCommand(u32),

    /// A filename cannot be stored in the fixed-size header field.
    #[error("invalid filename: {reason}")]
    InvalidFilename { reason: &'static str },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: u64, max: usize },

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before a complete packet was moved.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
