use std::io::{Read, Write};
use std::path::Path;

use bytes::Bytes;
use cix_frame::{Command, FrameError, Header, PacketReader, PacketWriter};
use cix_transport::CixStream;
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::status::WireErrorKind;

/// The client end of a cix connection.
///
/// Each method performs exactly one request/response exchange. Replies are
/// checked against the request: NAK and ERROR become
/// [`PeerError::Rejected`], any other foreign tag becomes
/// [`PeerError::UnexpectedResponse`]. In both cases the stream is left at a
/// packet boundary so the session can continue.
pub struct Client<R = CixStream, W = CixStream> {
    reader: PacketReader<R>,
    writer: PacketWriter<W>,
}

impl<R: Read, W: Write> Client<R, W> {
    /// Build a client from an already-connected reader and writer.
    pub fn from_parts(reader: PacketReader<R>, writer: PacketWriter<W>) -> Self {
        Self { reader, writer }
    }

    /// Fetch the contents of a remote file.
    pub fn get(&mut self, filename: &str) -> Result<Bytes> {
        let request = Header::with_filename(Command::Get, filename)?;
        let reply = self.exchange(request, None)?;
        self.recv_reply_payload(&reply)
    }

    /// Store `contents` as a remote file, replacing any existing one.
    pub fn put(&mut self, filename: &str, contents: &[u8]) -> Result<()> {
        let request = Header::with_filename(Command::Put, filename)?;
        self.exchange(request, Some(contents))?;
        Ok(())
    }

    /// Fetch the server's directory listing.
    pub fn ls(&mut self) -> Result<String> {
        let reply = self.exchange(Header::new(Command::Ls), None)?;
        let listing = self.recv_reply_payload(&reply)?;
        Ok(String::from_utf8_lossy(&listing).into_owned())
    }

    /// Remove a remote file.
    pub fn rm(&mut self, filename: &str) -> Result<()> {
        let request = Header::with_filename(Command::Rm, filename)?;
        self.exchange(request, None)?;
        Ok(())
    }

    /// GET `remote` and write it to `local`. Returns the number of bytes written.
    ///
    /// The local file is only created once the server has answered FILEOUT.
    pub fn fetch_file(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let contents = self.get(remote)?;
        std::fs::write(local, &contents).map_err(|source| PeerError::LocalIo {
            path: local.to_path_buf(),
            source,
        })?;
        Ok(contents.len() as u64)
    }

    /// Read `local` and PUT it as `remote`. Returns the number of bytes sent.
    pub fn store_file(&mut self, local: &Path, remote: &str) -> Result<u64> {
        let contents = std::fs::read(local).map_err(|source| PeerError::LocalIo {
            path: local.to_path_buf(),
            source,
        })?;
        self.put(remote, &contents)?;
        Ok(contents.len() as u64)
    }

    /// Send one request and return the reply header if it is the designated
    /// success tag for that request.
    fn exchange(&mut self, request: Header, payload: Option<&[u8]>) -> Result<Header> {
        let command = request.command;
        match payload {
            Some(payload) => self.writer.send_with_payload(request, payload)?,
            None => self.writer.send_header(&request)?,
        }

        let reply = self.reader.recv_header()?;
        debug!(request = %command, response = %reply.command, byte_count = reply.byte_count, "exchange complete");

        if reply.command.is_failure() {
            return Err(PeerError::Rejected {
                request: command,
                response: reply.command,
                kind: WireErrorKind::from_code(reply.byte_count),
            });
        }
        if !command.accepts_response(reply.command) {
            if reply.command.carries_payload() {
                self.reader.discard(reply.byte_count)?;
            }
            return Err(PeerError::UnexpectedResponse {
                request: command,
                response: reply.command,
            });
        }
        Ok(reply)
    }

    fn recv_reply_payload(&mut self, reply: &Header) -> Result<Bytes> {
        if !self.reader.accepts_payload(reply.byte_count) {
            self.reader.discard(reply.byte_count)?;
            return Err(FrameError::PayloadTooLarge {
                size: reply.byte_count,
                max: self.reader.config().max_payload_size,
            }
            .into());
        }
        Ok(self.reader.recv_payload(reply.byte_count)?)
    }

    /// Split the client back into its reader and writer.
    pub fn into_parts(self) -> (PacketReader<R>, PacketWriter<W>) {
        (self.reader, self.writer)
    }
}

impl Client<CixStream, CixStream> {
    /// Address of the server this client is connected to.
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.writer.get_ref().peer_addr().ok()
    }
}
