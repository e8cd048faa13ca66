//! Single-peer request/response channels over per-user local sockets.
//!
//! A host process creates a named channel, waits for exactly one peer, and
//! answers each framed request through an application handler. Messages are
//! tagged with a numeric serializer id so either side can evolve its set of
//! message types independently.
//!
//! # Crate Structure
//!
//! - [`transport`]: Channel names and the Unix domain socket listener
//! - [`frame`]: `[length][serializer id][payload]` framing and reassembly
//! - [`registry`]: Serializer registry mapping ids to message types
//! - [`channel`]: `PipeChannel` server loop, `PipeClient`, lifecycle

/// Re-export transport types.
pub mod transport {
    pub use pipechan_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipechan_frame::*;
}

/// Re-export serializer registry types.
pub mod registry {
    pub use pipechan_registry::*;
}

/// Re-export channel types.
pub mod channel {
    pub use pipechan_channel::*;
}
