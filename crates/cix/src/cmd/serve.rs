use cix_peer::{ServerConfig, ShutdownHandle, Supervisor};
use tracing::{error, info};

use crate::cmd::ServeArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_listening, print_server_stats, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.root.is_dir() {
        return Err(CliError::new(
            USAGE,
            format!("{}: not a directory", args.root.display()),
        ));
    }

    let config = ServerConfig {
        max_payload_size: args.max_payload,
        ..ServerConfig::default().with_root(&args.root)
    };
    let mut supervisor = Supervisor::bind(&args.host, args.port, config)
        .map_err(|err| peer_error("bind failed", err))?;

    install_ctrlc_handler(supervisor.shutdown_handle())?;
    print_listening(supervisor.local_addr(), &args.root, format);

    match supervisor.run() {
        Ok(stats) => print_server_stats(&stats, format),
        Err(err) => {
            error!(error = %err, active = supervisor.active_handlers(), "server stopping");
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(handle: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if handle.is_shutdown() {
            info!("interrupt received again, closing open connections");
        } else {
            info!("interrupt received, waiting for open connections; interrupt again to close them");
        }
        handle.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
