//! Command tags.
//!
//! Tags 0-15 are requests sent by the client. Tags 16 and up are responses
//! sent by the server. The two halves never overlap, so a reply can never be
//! mistaken for a new request.

use std::fmt;

/// A command tag carried in the first field of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Leave the session. Handled by the client, never sent.
    Exit = 0,
    /// Fetch a file from the server.
    Get = 1,
    /// Print the command summary. Handled by the client, never sent.
    Help = 2,
    /// List the server's working directory.
    Ls = 3,
    /// Store a file on the server.
    Put = 4,
    /// Remove a file from the server.
    Rm = 5,
    /// Request succeeded, no payload.
    Ack = 16,
    /// Request failed; byte count holds a wire error kind.
    Nak = 17,
    /// Request was not understood; byte count holds a wire error kind.
    Error = 18,
    /// File contents follow.
    FileOut = 19,
    /// Directory listing text follows.
    LsOut = 20,
}

impl Command {
    /// Every request tag.
    pub const REQUESTS: [Command; 6] = [
        Command::Exit,
        Command::Get,
        Command::Help,
        Command::Ls,
        Command::Put,
        Command::Rm,
    ];

    /// Every response tag.
    pub const RESPONSES: [Command; 5] = [
        Command::Ack,
        Command::Nak,
        Command::Error,
        Command::FileOut,
        Command::LsOut,
    ];

    /// Numeric wire value.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a command from its wire value.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::REQUESTS
            .iter()
            .chain(Self::RESPONSES.iter())
            .copied()
            .find(|command| command.tag() == tag)
    }

    pub fn is_request(self) -> bool {
        self.tag() < Command::Ack.tag()
    }

    pub fn is_response(self) -> bool {
        !self.is_request()
    }

    /// The response a server sends when this request succeeds.
    ///
    /// `None` for responses and for the client-local requests EXIT and HELP.
    pub fn success_response(self) -> Option<Command> {
        match self {
            Command::Get => Some(Command::FileOut),
            Command::Put => Some(Command::Ack),
            Command::Ls => Some(Command::LsOut),
            Command::Rm => Some(Command::Ack),
            _ => None,
        }
    }

    /// Whether `byte_count` is the length of a payload following the header.
    pub fn carries_payload(self) -> bool {
        matches!(self, Command::Put | Command::FileOut | Command::LsOut)
    }

    /// Whether this response reports a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Command::Nak | Command::Error)
    }

    /// Whether `response` is a legal reply to this request.
    pub fn accepts_response(self, response: Command) -> bool {
        response.is_failure() || self.success_response() == Some(response)
    }

    /// Returns a human-readable name for the tag.
    pub fn name(self) -> &'static str {
        match self {
            Command::Exit => "EXIT",
            Command::Get => "GET",
            Command::Help => "HELP",
            Command::Ls => "LS",
            Command::Put => "PUT",
            Command::Rm => "RM",
            Command::Ack => "ACK",
            Command::Nak => "NAK",
            Command::Error => "ERROR",
            Command::FileOut => "FILEOUT",
            Command::LsOut => "LSOUT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
