//! Wire error kinds carried in the byte count of NAK and ERROR replies.
//!
//! Raw OS error numbers differ between platforms, so failures are mapped
//! onto this closed set before they are sent. The full OS error is only
//! logged on the side where it happened.

use std::fmt;
use std::io;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u64)]
pub enum WireErrorKind {
    NotFound = 1,
    PermissionDenied = 2,
    AlreadyExists = 3,
    IsADirectory = 4,
    InvalidFilename = 5,
    TooLarge = 6,
    UnknownCommand = 7,
    ListingFailed = 8,
    Other = 255,
}

impl WireErrorKind {
    const ALL: [WireErrorKind; 9] = [
        WireErrorKind::NotFound,
        WireErrorKind::PermissionDenied,
        WireErrorKind::AlreadyExists,
        WireErrorKind::IsADirectory,
        WireErrorKind::InvalidFilename,
        WireErrorKind::TooLarge,
        WireErrorKind::UnknownCommand,
        WireErrorKind::ListingFailed,
        WireErrorKind::Other,
    ];

    /// Value placed in the header byte count.
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Decode a byte count. Unknown values map to [`WireErrorKind::Other`].
    pub fn from_code(code: u64) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.code() == code)
            .unwrap_or(WireErrorKind::Other)
    }

    /// Classify a local I/O failure.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => WireErrorKind::NotFound,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                WireErrorKind::PermissionDenied
            }
            io::ErrorKind::AlreadyExists => WireErrorKind::AlreadyExists,
            io::ErrorKind::IsADirectory => WireErrorKind::IsADirectory,
            io::ErrorKind::InvalidInput | io::ErrorKind::NotADirectory => {
                WireErrorKind::InvalidFilename
            }
            io::ErrorKind::FileTooLarge | io::ErrorKind::OutOfMemory => WireErrorKind::TooLarge,
            _ => WireErrorKind::Other,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            WireErrorKind::NotFound => "no such file",
            WireErrorKind::PermissionDenied => "permission denied",
            WireErrorKind::AlreadyExists => "file exists",
            WireErrorKind::IsADirectory => "is a directory",
            WireErrorKind::InvalidFilename => "invalid filename",
            WireErrorKind::TooLarge => "file too large",
            WireErrorKind::UnknownCommand => "unknown command",
            WireErrorKind::ListingFailed => "directory listing failed",
            WireErrorKind::Other => "server error",
        }
    }
}

impl fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
