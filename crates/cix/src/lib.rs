//! Remote file access over a framed TCP protocol.
//!
//! A client fetches, stores, removes and lists files in a server's working
//! directory over one persistent connection. The server gives every
//! connection its own handler thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and connected stream
//! - [`frame`]: Command tags, fixed-layout header codec, exact-count packet I/O
//! - [`peer`]: Client exchanges, server dispatcher and connection supervisor

/// Re-export transport types.
pub mod transport {
    pub use cix_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cix_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use cix_peer::*;
}
