//! TCP stream transport for cix.
//!
//! Provides the listening socket used by the server supervisor and the
//! connected [`CixStream`] that every higher layer reads and writes.
//!
//! This is the lowest layer of cix. Framing, the header codec and the
//! command protocol all build on the [`CixStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::CixStream;
pub use tcp::TcpTransport;
