//! Exact-count packet framing and the fixed-layout cix header.
//!
//! Every exchange starts with one [`Header`] of exactly [`HEADER_SIZE`] bytes:
//! - A 4-byte little-endian command tag
//! - A 256-byte zero-padded filename
//! - An 8-byte little-endian byte count
//!
//! followed by exactly `byte_count` payload bytes when the command carries
//! data. [`PacketReader`] and [`PacketWriter`] hide partial reads and writes,
//! so callers always move whole packets.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_header, encode_header, Header, PacketConfig, DEFAULT_MAX_PAYLOAD, FILENAME_SIZE,
    HEADER_SIZE,
};
pub use command::Command;
pub use error::{FrameError, Result};
pub use reader::PacketReader;
pub use writer::PacketWriter;
