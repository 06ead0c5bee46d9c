use cix_frame::{PacketConfig, PacketReader, PacketWriter};
use cix_transport::{CixStream, TcpTransport};
use tracing::info;

use crate::client::Client;
use crate::error::Result;

/// Connect to a cix server as a client.
pub fn connect(host: &str, port: u16) -> Result<Client> {
    connect_with_config(host, port, &PacketConfig::default())
}

/// Connect with explicit packet configuration.
pub fn connect_with_config(host: &str, port: u16, config: &PacketConfig) -> Result<Client> {
    let stream = TcpTransport::connect(host, port)?;
    let client = client_from_stream(stream, config)?;
    if let Some(addr) = client.peer_addr() {
        info!(%addr, "connected to server");
    }
    Ok(client)
}

/// Wrap an already-connected stream.
pub fn client_from_stream(stream: CixStream, config: &PacketConfig) -> Result<Client> {
    let reader_stream = stream.try_clone()?;
    let reader = PacketReader::with_config_stream(reader_stream, config.clone())?;
    let writer = PacketWriter::with_config_stream(stream, config.clone())?;
    Ok(Client::from_parts(reader, writer))
}
