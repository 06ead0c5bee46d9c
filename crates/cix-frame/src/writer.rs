use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use cix_transport::CixStream;
use tracing::trace;

use crate::codec::{encode_header, Header, PacketConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes exact-length packets to any `Write` stream.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE),
            config,
        }
    }

    /// Write all of `data` (blocking), then flush.
    pub fn send_packet(&mut self, data: &[u8]) -> Result<()> {
        write_exact(&mut self.inner, data)?;
        self.flush()
    }

    /// Encode and send a header.
    pub fn send_header(&mut self, header: &Header) -> Result<()> {
        trace!(?header, "sending header");
        self.buf.clear();
        encode_header(header, &mut self.buf);
        write_exact(&mut self.inner, &self.buf)?;
        self.flush()
    }

    /// Send a payload, enforcing the configured size limit.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.check_payload_size(payload.len())?;
        self.send_packet(payload)
    }

    /// Send `header` with its byte count set to `payload.len()`, then the payload.
    pub fn send_with_payload(&mut self, mut header: Header, payload: &[u8]) -> Result<()> {
        self.check_payload_size(payload.len())?;
        header.byte_count = payload.len() as u64;
        self.send_header(&header)?;
        self.send_packet(payload)
    }

    fn check_payload_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len as u64,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent sends.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketWriter<CixStream> {
    /// Create a packet writer for `CixStream` and apply write timeout from config.
    pub fn with_config_stream(inner: CixStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn write_exact<T: Write>(inner: &mut T, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match inner.write(&data[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
