use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::command::Command;
use crate::error::{FrameError, Result};

/// Capacity of the filename field. Names must be strictly shorter.
pub const FILENAME_SIZE: usize = 256;

/// Header: command (4) + filename (256) + byte count (8) = 268 bytes.
pub const HEADER_SIZE: usize = 4 + FILENAME_SIZE + 8;

/// Default maximum payload size: 1 GiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024 * 1024;

/// The fixed-layout control block that starts every exchange.
///
/// `byte_count` is the payload length for FILEOUT, LSOUT and PUT, and a wire
/// error kind for NAK and ERROR.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    filename: [u8; FILENAME_SIZE],
    pub byte_count: u64,
}

impl Header {
    /// Create a header with an empty filename and zero byte count.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            filename: [0; FILENAME_SIZE],
            byte_count: 0,
        }
    }

    /// Create a header naming `filename`.
    pub fn with_filename(command: Command, filename: &str) -> Result<Self> {
        let mut header = Self::new(command);
        header.set_filename(filename)?;
        Ok(header)
    }

    /// Create a response header. The filename is always empty.
    pub fn reply(command: Command, byte_count: u64) -> Self {
        Self {
            byte_count,
            ..Self::new(command)
        }
    }

    /// Store `filename`, zero-filling the rest of the field.
    ///
    /// Names that do not fit with at least one trailing zero, or that
    /// contain a NUL byte, are rejected rather than truncated.
    pub fn set_filename(&mut self, filename: &str) -> Result<()> {
        let bytes = filename.as_bytes();
        if bytes.len() >= FILENAME_SIZE {
            return Err(FrameError::InvalidFilename {
                reason: "longer than 255 bytes",
            });
        }
        if bytes.contains(&0) {
            return Err(FrameError::InvalidFilename {
                reason: "contains a NUL byte",
            });
        }
        self.filename = [0; FILENAME_SIZE];
        self.filename[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Zero the filename field.
    pub fn clear_filename(&mut self) {
        self.filename = [0; FILENAME_SIZE];
    }

    /// Filename bytes up to the first zero.
    pub fn filename_bytes(&self) -> &[u8] {
        let end = self
            .filename
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(FILENAME_SIZE);
        &self.filename[..end]
    }

    /// Filename as UTF-8.
    pub fn filename(&self) -> Result<&str> {
        std::str::from_utf8(self.filename_bytes()).map_err(|_| FrameError::InvalidFilename {
            reason: "not valid UTF-8",
        })
    }

    /// The whole fixed-size filename field, padding included.
    pub fn raw_filename(&self) -> &[u8; FILENAME_SIZE] {
        &self.filename
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("command", &self.command)
            .field(
                "filename",
                &String::from_utf8_lossy(self.filename_bytes()),
            )
            .field("byte_count", &self.byte_count)
            .finish()
    }
}

/// Encode a header into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬────────────────────────┬──────────────┐
/// │ Command      │ Filename               │ Byte count   │
/// │ (4B LE)      │ (256B, zero padded)    │ (8B LE)      │
/// └──────────────┴────────────────────────┴──────────────┘
/// ```
pub fn encode_header(header: &Header, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_u32_le(header.command.tag());
    dst.put_slice(&header.filename);
    dst.put_u64_le(header.byte_count);
}

/// Decode a header from exactly [`HEADER_SIZE`] bytes.
pub fn decode_header(src: &[u8; HEADER_SIZE]) -> Result<Header> {
    let mut src = &src[..];
    let tag = src.get_u32_le();
    let mut filename = [0u8; FILENAME_SIZE];
    src.copy_to_slice(&mut filename);
    let byte_count = src.get_u64_le();

    let command = Command::from_tag(tag).ok_or(FrameError::UnknownCommand(tag))?;

    Ok(Header {
        command,
        filename,
        byte_count,
    })
}

/// Configuration for packet readers and writers.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Maximum payload size in bytes. Default: 1 GiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
