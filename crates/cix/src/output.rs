use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::Path;

use clap::ValueEnum;
use cix_frame::Command;
use cix_peer::{PeerError, SupervisorStats, WireErrorKind};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HelpEntry {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

pub static HELP_ENTRIES: [HelpEntry; 6] = [
    HelpEntry {
        name: "exit",
        usage: "exit",
        description: "Exit the program.  Equivalent to EOF.",
    },
    HelpEntry {
        name: "get",
        usage: "get filename",
        description: "Copy remote file to local host.",
    },
    HelpEntry {
        name: "help",
        usage: "help",
        description: "Print help summary.",
    },
    HelpEntry {
        name: "ls",
        usage: "ls",
        description: "List names of files on remote server.",
    },
    HelpEntry {
        name: "put",
        usage: "put filename",
        description: "Copy local file to remote host.",
    },
    HelpEntry {
        name: "rm",
        usage: "rm filename",
        description: "Remove file from remote server.",
    },
];

/// Result of one line of client input.
#[derive(Debug)]
pub enum Outcome {
    Help,
    Listing(String),
    Fetched { filename: String, bytes: u64 },
    Stored { filename: String, bytes: u64 },
    Removed { filename: String },
    Failed {
        request: Command,
        filename: Option<String>,
        error: PeerError,
    },
    Invalid { line: String },
    Usage { request: Command },
}

#[derive(Serialize, Default)]
struct OutcomeRecord<'a> {
    command: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<WireErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    listing: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commands: Option<&'a [HelpEntry]>,
}

/// Write `outcome` in `format`. Successful results go to `out`; in pretty
/// and table formats diagnostics go to `err`, in JSON everything goes to
/// `out` so a script sees one record per input line.
pub fn render(
    outcome: &Outcome,
    format: OutputFormat,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => render_json(outcome, out),
        OutputFormat::Table => render_table(outcome, out, err),
        OutputFormat::Pretty => render_pretty(outcome, out, err),
    }
}

fn render_pretty(outcome: &Outcome, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()> {
    match outcome {
        Outcome::Help => {
            for entry in &HELP_ENTRIES {
                writeln!(out, "{:<12} - {}", entry.usage, entry.description)?;
            }
        }
        Outcome::Listing(listing) => write!(out, "{listing}")?,
        Outcome::Fetched { .. } => writeln!(out, "sent GET, server returned FILEOUT")?,
        Outcome::Stored { .. } => writeln!(out, "sent PUT, server returned ACK")?,
        Outcome::Removed { .. } => writeln!(out, "sent RM, server returned ACK")?,
        Outcome::Failed {
            request,
            filename,
            error,
        } => writeln!(err, "{}", failure_message(*request, filename.as_deref(), error))?,
        Outcome::Invalid { line } => writeln!(err, "{line}: invalid command")?,
        Outcome::Usage { request } => writeln!(err, "Usage: {} filename", verb(*request))?,
    }
    out.flush()?;
    err.flush()
}

fn render_table(outcome: &Outcome, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()> {
    let (request, filename, status, detail) = match outcome {
        Outcome::Help => {
            let mut table = new_table(vec!["COMMAND", "USAGE", "DESCRIPTION"]);
            for entry in &HELP_ENTRIES {
                table.add_row(vec![entry.name, entry.usage, entry.description]);
            }
            writeln!(out, "{table}")?;
            return out.flush();
        }
        Outcome::Listing(listing) => {
            write!(out, "{listing}")?;
            return out.flush();
        }
        Outcome::Invalid { .. } | Outcome::Usage { .. } => {
            return render_pretty(outcome, out, err);
        }
        Outcome::Fetched { filename, bytes } => {
            (Command::Get, Some(filename.as_str()), "FILEOUT", format!("{bytes} bytes"))
        }
        Outcome::Stored { filename, bytes } => {
            (Command::Put, Some(filename.as_str()), "ACK", format!("{bytes} bytes"))
        }
        Outcome::Removed { filename } => (Command::Rm, Some(filename.as_str()), "ACK", String::new()),
        Outcome::Failed {
            request,
            filename,
            error,
        } => {
            let status = match error {
                PeerError::Rejected { response, .. }
                | PeerError::UnexpectedResponse { response, .. } => response.name(),
                _ => "FAILED",
            };
            let detail = match error {
                PeerError::Rejected { kind, .. } => kind.description().to_string(),
                other => other.to_string(),
            };
            (*request, filename.as_deref(), status, detail)
        }
    };

    let mut table = new_table(vec!["COMMAND", "FILE", "STATUS", "DETAIL"]);
    table.add_row(vec![
        request.name().to_string(),
        filename.unwrap_or("").to_string(),
        status.to_string(),
        detail,
    ]);
    writeln!(out, "{table}")?;
    out.flush()
}

fn render_json(outcome: &Outcome, out: &mut dyn Write) -> io::Result<()> {
    let record = match outcome {
        Outcome::Help => OutcomeRecord {
            command: verb(Command::Help),
            status: "ok",
            commands: Some(&HELP_ENTRIES[..]),
            ..Default::default()
        },
        Outcome::Listing(listing) => OutcomeRecord {
            command: verb(Command::Ls),
            status: "ok",
            response: Some(Command::LsOut.name()),
            listing: Some(listing),
            ..Default::default()
        },
        Outcome::Fetched { filename, bytes } => OutcomeRecord {
            command: verb(Command::Get),
            status: "ok",
            filename: Some(filename),
            bytes: Some(*bytes),
            response: Some(Command::FileOut.name()),
            ..Default::default()
        },
        Outcome::Stored { filename, bytes } => OutcomeRecord {
            command: verb(Command::Put),
            status: "ok",
            filename: Some(filename),
            bytes: Some(*bytes),
            response: Some(Command::Ack.name()),
            ..Default::default()
        },
        Outcome::Removed { filename } => OutcomeRecord {
            command: verb(Command::Rm),
            status: "ok",
            filename: Some(filename),
            response: Some(Command::Ack.name()),
            ..Default::default()
        },
        Outcome::Failed {
            request,
            filename,
            error,
        } => {
            let (response, kind) = match error {
                PeerError::Rejected { response, kind, .. } => (Some(response.name()), Some(*kind)),
                PeerError::UnexpectedResponse { response, .. } => (Some(response.name()), None),
                _ => (None, None),
            };
            OutcomeRecord {
                command: verb(*request),
                status: "failed",
                filename: filename.as_deref(),
                response,
                kind,
                message: Some(failure_message(*request, filename.as_deref(), error)),
                ..Default::default()
            }
        }
        Outcome::Invalid { line } => OutcomeRecord {
            command: line.split_whitespace().next().unwrap_or("").to_string(),
            status: "invalid",
            message: Some(format!("{line}: invalid command")),
            ..Default::default()
        },
        Outcome::Usage { request } => OutcomeRecord {
            command: verb(*request),
            status: "usage",
            message: Some(format!("Usage: {} filename", verb(*request))),
            ..Default::default()
        },
    };

    let line = serde_json::to_string(&record).map_err(io::Error::other)?;
    writeln!(out, "{line}")?;
    out.flush()
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    addr: String,
    root: &'a str,
}

/// Announce the bound address. With `--port 0` this is the only place the
/// chosen port is reported.
pub fn print_listening(addr: SocketAddr, root: &Path, format: OutputFormat) {
    let root = root.to_string_lossy();
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
                root: &root,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {addr}, serving {root}");
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    event: &'static str,
    accepted: u64,
    reaped: u64,
    spawn_failures: u64,
}

pub fn print_server_stats(stats: &SupervisorStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StatsOutput {
                event: "stopped",
                accepted: stats.accepted,
                reaped: stats.reaped,
                spawn_failures: stats.spawn_failures,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["ACCEPTED", "REAPED", "SPAWN FAILURES"]);
            table.add_row(vec![
                stats.accepted.to_string(),
                stats.reaped.to_string(),
                stats.spawn_failures.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "stopped: {} connections accepted, {} handlers reaped",
                stats.accepted, stats.reaped
            );
        }
    }
}

/// One-line diagnostic for a failed command.
///
/// Server replies already name the exchange (`sent RM, server returned NAK`);
/// local and framing failures are prefixed with the command.
pub fn failure_message(request: Command, filename: Option<&str>, error: &PeerError) -> String {
    match (error, filename) {
        (PeerError::Rejected { .. } | PeerError::UnexpectedResponse { .. }, _) => error.to_string(),
        (PeerError::LocalIo { .. }, _) | (_, None) => format!("{}: {error}", verb(request)),
        (_, Some(filename)) => format!("{}: {filename}: {error}", verb(request)),
    }
}

fn verb(command: Command) -> String {
    command.name().to_ascii_lowercase()
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
