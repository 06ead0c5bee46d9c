use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use cix_transport::CixStream;
use tracing::trace;

use crate::codec::{decode_header, Header, PacketConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const DISCARD_CHUNK_SIZE: usize = 8 * 1024;

/// Reads exact-length packets from any `Read` stream.
///
/// Handles partial reads internally; callers always get the number of
/// bytes they asked for, or an error.
pub struct PacketReader<T> {
    inner: T,
    config: PacketConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self { inner, config }
    }

    /// Fill `buf` completely (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` if EOF is reached first.
    pub fn recv_packet(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.inner.read(&mut buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Read the next header.
    pub fn recv_header(&mut self) -> Result<Header> {
        let mut wire = [0u8; HEADER_SIZE];
        self.recv_packet(&mut wire)?;
        let header = decode_header(&wire)?;
        trace!(?header, "received header");
        Ok(header)
    }

    /// Read a payload of exactly `len` bytes.
    pub fn recv_payload(&mut self, len: u64) -> Result<Bytes> {
        let len = self.check_payload_size(len)?;
        let mut buf = BytesMut::zeroed(len);
        self.recv_packet(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Read and drop `len` bytes, keeping the stream at a packet boundary.
    ///
    /// Used to skip a payload that will not be accepted.
    pub fn discard(&mut self, len: u64) -> Result<()> {
        let mut chunk = [0u8; DISCARD_CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(DISCARD_CHUNK_SIZE as u64) as usize;
            self.recv_packet(&mut chunk[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Whether a payload of `len` bytes is within the configured limit.
    pub fn accepts_payload(&self, len: u64) -> bool {
        len <= self.config.max_payload_size as u64
    }

    fn check_payload_size(&self, len: u64) -> Result<usize> {
        if !self.accepts_payload(len) {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }
        Ok(len as usize)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent reads.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketReader<CixStream> {
    /// Create a packet reader for `CixStream` and apply read timeout from config.
    pub fn with_config_stream(inner: CixStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: cix_transport::TransportError) -> FrameError {
    match err {
        cix_transport::TransportError::Io(io) | cix_transport::TransportError::Accept(io) => {
            FrameError::Io(io)
        }
        cix_transport::TransportError::Bind { source, .. }
        | cix_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
    }
}
