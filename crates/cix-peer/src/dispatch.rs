use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use cix_frame::{Command, FrameError, Header, PacketReader, PacketWriter, DEFAULT_MAX_PAYLOAD};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::status::WireErrorKind;

/// Server-side behavior shared by every connection handler.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory that client filenames are resolved against and that LS lists.
    pub root: PathBuf,
    /// Largest file accepted by PUT or served by GET, in bytes.
    pub max_payload_size: usize,
    /// Program and arguments producing the LS listing. Stderr is captured too.
    pub listing_command: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            listing_command: vec!["ls".to_string(), "-l".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

/// Outcome of one handled request, used for logging.
enum Reply {
    Sent(Command),
    Failed(WireErrorKind),
}

/// Serve one connection until the client closes it.
///
/// Loops `AWAIT_HEADER -> DISPATCH -> reply`. Returns the number of
/// exchanges served when the peer closes cleanly; transport failures end the
/// loop with an error. Local file failures are answered with NAK and never
/// end the loop.
pub fn serve_connection<R: Read, W: Write>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    config: &ServerConfig,
) -> Result<u64> {
    let mut exchanges = 0u64;
    loop {
        let header = match reader.recv_header() {
            Ok(header) => header,
            Err(FrameError::ConnectionClosed) => {
                debug!(exchanges, "client closed connection");
                return Ok(exchanges);
            }
            Err(FrameError::UnknownCommand(tag)) => {
                warn!(tag, "invalid header from client: unknown command tag");
                send_error(writer, WireErrorKind::UnknownCommand)?;
                exchanges += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let command = header.command;
        let reply = match command {
            Command::Get => reply_get(writer, &header, config)?,
            Command::Put => reply_put(reader, writer, &header, config)?,
            Command::Ls => reply_ls(writer, config)?,
            Command::Rm => reply_rm(writer, &header, config)?,
            _ => {
                warn!(?header, "invalid header from client");
                send_error(writer, WireErrorKind::UnknownCommand)?;
                Reply::Failed(WireErrorKind::UnknownCommand)
            }
        };
        exchanges += 1;

        match reply {
            Reply::Sent(response) => debug!(request = %command, %response, "request served"),
            Reply::Failed(kind) => debug!(request = %command, %kind, "request failed"),
        }
    }
}

fn reply_get<W: Write>(
    writer: &mut PacketWriter<W>,
    header: &Header,
    config: &ServerConfig,
) -> Result<Reply> {
    let path = match resolve(config, header) {
        Ok(path) => path,
        Err(kind) => return send_nak(writer, kind),
    };

    match read_for_get(&path, config.max_payload_size) {
        Ok(contents) => {
            writer.send_with_payload(Header::reply(Command::FileOut, 0), &contents)?;
            info!(path = %path.display(), bytes = contents.len(), "sent file");
            Ok(Reply::Sent(Command::FileOut))
        }
        Err(kind) => {
            warn!(path = %path.display(), %kind, "get failed");
            send_nak(writer, kind)
        }
    }
}

fn read_for_get(path: &Path, max: usize) -> std::result::Result<Vec<u8>, WireErrorKind> {
    let mut file = File::open(path).map_err(|err| log_io("get: open", path, &err))?;
    let metadata = file
        .metadata()
        .map_err(|err| log_io("get: stat", path, &err))?;
    if metadata.is_dir() {
        return Err(WireErrorKind::IsADirectory);
    }
    if metadata.len() > max as u64 {
        return Err(WireErrorKind::TooLarge);
    }
    let mut contents = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut contents)
        .map_err(|err| log_io("get: read", path, &err))?;
    if contents.len() > max {
        return Err(WireErrorKind::TooLarge);
    }
    Ok(contents)
}

fn reply_put<R: Read, W: Write>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    header: &Header,
    config: &ServerConfig,
) -> Result<Reply> {
    // The body is always consumed so the next header starts on a boundary.
    if !reader.accepts_payload(header.byte_count) {
        reader.discard(header.byte_count)?;
        warn!(bytes = header.byte_count, "put rejected: payload too large");
        return send_nak(writer, WireErrorKind::TooLarge);
    }
    let contents = reader.recv_payload(header.byte_count)?;

    let path = match resolve(config, header) {
        Ok(path) => path,
        Err(kind) => return send_nak(writer, kind),
    };

    if let Err(err) = write_file(&path, &contents) {
        let kind = log_io("put: write", &path, &err);
        return send_nak(writer, kind);
    }

    info!(path = %path.display(), bytes = contents.len(), "stored file");
    writer.send_header(&Header::reply(Command::Ack, 0))?;
    Ok(Reply::Sent(Command::Ack))
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    if let Err(err) = file.write_all(contents).and_then(|()| file.flush()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(err);
    }
    Ok(())
}

fn reply_ls<W: Write>(writer: &mut PacketWriter<W>, config: &ServerConfig) -> Result<Reply> {
    let listing = match run_listing(config) {
        Ok(listing) => listing,
        Err(err) => {
            warn!(command = ?config.listing_command, error = %err, "listing failed");
            return send_nak(writer, WireErrorKind::ListingFailed);
        }
    };
    if listing.len() > config.max_payload_size {
        return send_nak(writer, WireErrorKind::TooLarge);
    }
    writer.send_with_payload(Header::reply(Command::LsOut, 0), &listing)?;
    Ok(Reply::Sent(Command::LsOut))
}

fn run_listing(config: &ServerConfig) -> io::Result<Vec<u8>> {
    let (program, args) = config
        .listing_command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty listing command"))?;
    let output = std::process::Command::new(program)
        .args(args)
        .current_dir(&config.root)
        .stdin(Stdio::null())
        .output()?;
    debug!(command = ?config.listing_command, status = %output.status, "listing finished");

    let mut listing = output.stdout;
    listing.extend_from_slice(&output.stderr);
    Ok(listing)
}

fn reply_rm<W: Write>(
    writer: &mut PacketWriter<W>,
    header: &Header,
    config: &ServerConfig,
) -> Result<Reply> {
    let path = match resolve(config, header) {
        Ok(path) => path,
        Err(kind) => return send_nak(writer, kind),
    };
    if let Err(err) = std::fs::remove_file(&path) {
        let kind = log_io("rm", &path, &err);
        return send_nak(writer, kind);
    }
    info!(path = %path.display(), "removed file");
    writer.send_header(&Header::reply(Command::Ack, 0))?;
    Ok(Reply::Sent(Command::Ack))
}

fn resolve(config: &ServerConfig, header: &Header) -> std::result::Result<PathBuf, WireErrorKind> {
    match header.filename() {
        Ok("") | Err(_) => {
            warn!(?header, "rejecting unusable filename");
            Err(WireErrorKind::InvalidFilename)
        }
        Ok(name) => Ok(config.root.join(name)),
    }
}

fn log_io(context: &str, path: &Path, err: &io::Error) -> WireErrorKind {
    warn!(path = %path.display(), error = %err, "{context} failed");
    WireErrorKind::from_io(err)
}

/// Reply headers are built fresh, so the filename field is always zero.
fn send_nak<W: Write>(writer: &mut PacketWriter<W>, kind: WireErrorKind) -> Result<Reply> {
    writer.send_header(&Header::reply(Command::Nak, kind.code()))?;
    Ok(Reply::Failed(kind))
}

fn send_error<W: Write>(writer: &mut PacketWriter<W>, kind: WireErrorKind) -> Result<()> {
    writer.send_header(&Header::reply(Command::Error, kind.code()))?;
    Ok(())
}
