use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use cix_frame::Command;
use cix_peer::Client;
use tracing::{debug, error};

use crate::output::{render, Outcome, OutputFormat};

/// One parsed line of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Exit,
    Help,
    Ls,
    Get(String),
    Put(String),
    Rm(String),
}

/// A line that could not be turned into a [`UserCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// First token is not a known command.
    Invalid(String),
    /// Known command with the wrong number of arguments.
    Usage(Command),
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Exit,
    EndOfInput,
    ConnectionLost,
}

/// Parse one whitespace-delimited input line. Blank lines yield `Ok(None)`.
///
/// `exit`, `help` and `ls` ignore trailing tokens; the filename commands take
/// exactly one argument.
pub fn parse_line(line: &str) -> Result<Option<UserCommand>, InputError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&first, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let with_filename = |request: Command, build: fn(String) -> UserCommand| match args {
        [filename] => Ok(Some(build((*filename).to_string()))),
        _ => Err(InputError::Usage(request)),
    };

    match first {
        "exit" => Ok(Some(UserCommand::Exit)),
        "help" => Ok(Some(UserCommand::Help)),
        "ls" => Ok(Some(UserCommand::Ls)),
        "get" => with_filename(Command::Get, UserCommand::Get),
        "put" => with_filename(Command::Put, UserCommand::Put),
        "rm" => with_filename(Command::Rm, UserCommand::Rm),
        _ => Err(InputError::Invalid(line.trim().to_string())),
    }
}

/// Read-eval loop over textual commands on one connection.
///
/// Local files for `get` and `put` are resolved against `local_root`; the
/// remote side sees the name as typed.
pub struct Session<R, W> {
    client: Client<R, W>,
    local_root: PathBuf,
    format: OutputFormat,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(client: Client<R, W>, local_root: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            client,
            local_root: local_root.into(),
            format,
        }
    }

    /// Run until `exit`, end of input, or a failure that leaves the
    /// connection unusable. Only errors writing to `out`/`err` or reading
    /// `input` are returned.
    pub fn run<I: BufRead>(
        &mut self,
        input: I,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<SessionEnd> {
        for line in input.lines() {
            let line = line?;
            let command = match parse_line(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(InputError::Invalid(line)) => {
                    render(&Outcome::Invalid { line }, self.format, out, err)?;
                    continue;
                }
                Err(InputError::Usage(request)) => {
                    render(&Outcome::Usage { request }, self.format, out, err)?;
                    continue;
                }
            };

            let Some(outcome) = self.execute(command) else {
                debug!("exit requested");
                return Ok(SessionEnd::Exit);
            };
            render(&outcome, self.format, out, err)?;

            if let Outcome::Failed { error: failure, .. } = &outcome {
                if failure.is_fatal() {
                    error!(error = %failure, "connection lost, ending session");
                    return Ok(SessionEnd::ConnectionLost);
                }
            }
        }

        debug!("end of input");
        Ok(SessionEnd::EndOfInput)
    }

    /// Perform the exchange for one command. `None` means the session ends.
    fn execute(&mut self, command: UserCommand) -> Option<Outcome> {
        let outcome = match command {
            UserCommand::Exit => return None,
            UserCommand::Help => Outcome::Help,
            UserCommand::Ls => match self.client.ls() {
                Ok(listing) => Outcome::Listing(listing),
                Err(error) => Outcome::Failed {
                    request: Command::Ls,
                    filename: None,
                    error,
                },
            },
            UserCommand::Get(filename) => {
                let local = self.local_root.join(&filename);
                match self.client.fetch_file(&filename, &local) {
                    Ok(bytes) => Outcome::Fetched { filename, bytes },
                    Err(error) => failed(Command::Get, filename, error),
                }
            }
            UserCommand::Put(filename) => {
                let local = self.local_root.join(&filename);
                match self.client.store_file(&local, &filename) {
                    Ok(bytes) => Outcome::Stored { filename, bytes },
                    Err(error) => failed(Command::Put, filename, error),
                }
            }
            UserCommand::Rm(filename) => match self.client.rm(&filename) {
                Ok(()) => Outcome::Removed { filename },
                Err(error) => failed(Command::Rm, filename, error),
            },
        };
        Some(outcome)
    }
}

fn failed(request: Command, filename: String, error: cix_peer::PeerError) -> Outcome {
    Outcome::Failed {
        request,
        filename: Some(filename),
        error,
    }
}
