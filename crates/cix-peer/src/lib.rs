//! Client and server ends of the cix command protocol.
//!
//! Each request is a strict exchange: the client sends one header (plus the
//! file body for PUT) and the server answers with exactly one response
//! header (plus the file body for GET or the listing for LS).
//!
//! - [`Client`] performs exchanges and checks response pairing.
//! - [`serve_connection`] runs the server side of one connection.
//! - [`Supervisor`] accepts connections, gives each its own handler thread
//!   and reaps finished handlers.

pub mod client;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod status;
pub mod supervisor;

pub use client::Client;
pub use connector::{client_from_stream, connect, connect_with_config};
pub use dispatch::{serve_connection, ServerConfig};
pub use error::{PeerError, Result};
pub use status::WireErrorKind;
pub use supervisor::{ShutdownHandle, Supervisor, SupervisorStats};
