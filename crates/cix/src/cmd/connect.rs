use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use cix_frame::PacketConfig;
use cix_peer::client_from_stream;
use cix_transport::{CixStream, TcpTransport};
use tracing::info;

use crate::cmd::ConnectArgs;
use crate::exit::{io_error, peer_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;
use crate::session::Session;

/// Connection the interrupt handler closes before exiting.
type LiveConnection = Arc<Mutex<Option<CixStream>>>;

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let live: LiveConnection = Arc::default();
    install_ctrlc_handler(Arc::clone(&live))?;

    let stream = TcpTransport::connect(&args.host, args.port)
        .map_err(|err| transport_error("connect failed", err))?;
    let closer = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;
    *live.lock().unwrap_or_else(PoisonError::into_inner) = Some(closer);

    let client = client_from_stream(stream, &PacketConfig::default())
        .map_err(|err| peer_error("connect failed", err))?;
    info!(host = %args.host, port = args.port, "connected");

    let mut session = Session::new(client, args.local_dir, format);
    let end = session
        .run(io::stdin().lock(), &mut io::stdout(), &mut io::stderr())
        .map_err(|err| io_error("console I/O failed", err))?;

    info!(?end, "session ended");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(live: LiveConnection) -> CliResult<()> {
    ctrlc::set_handler(move || {
        eprintln!("interrupted, closing connection");
        if let Some(stream) = live.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = stream.shutdown();
        }
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
