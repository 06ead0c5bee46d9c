use clap::{Args, Subcommand};
use std::path::PathBuf;

use cix_frame::DEFAULT_MAX_PAYLOAD;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod connect;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve files from a directory to cix clients.
    Serve(ServeArgs),
    /// Open an interactive session with a cix server.
    Connect(ConnectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Connect(args) => connect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on (0 picks a free port).
    #[arg(long, short = 'p', env = "CIX_SERVER_PORT")]
    pub port: u16,
    /// Directory served to clients.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,
    /// Largest file accepted or served, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server host name or address.
    #[arg(default_value = "localhost", env = "CIX_SERVER_HOST")]
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', env = "CIX_SERVER_PORT")]
    pub port: u16,
    /// Local directory that `get` writes into and `put` reads from.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub local_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
