//! Per-user named local channels.
//!
//! Translates a logical channel name into a concrete OS object and provides
//! the listener/stream pair the channel layer runs on:
//! - Unix domain sockets under a per-user directory (Linux/macOS)
//!
//! This is the lowest layer of pipechan. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod error;
#[cfg(unix)]
pub mod name;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use name::PipeName;
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
