//! Single-connection request/response server over a named local channel.
//!
//! A [`PipeChannel`] binds a [`PipeName`](pipechan_transport::PipeName),
//! accepts exactly one peer, and then runs a background loop that reads one
//! frame, dispatches it to the [`RequestHandler`], and writes the response
//! before reading the next. [`PipeChannel::dispose`] waits, bounded, for the
//! loop to finish and always releases the socket.

pub mod channel;
pub mod client;
pub mod config;
mod connection;
pub mod dispatcher;
pub mod error;
mod lifecycle;

pub use channel::{ChannelState, PipeChannel};
pub use client::PipeClient;
pub use config::{ChannelConfig, DEFAULT_DISPOSE_TIMEOUT, DEFAULT_READ_BUFFER_CAPACITY};
pub use dispatcher::{
    handler_fn, HandlerError, HandlerFn, HandlerResult, OperationCancelled, RequestContext,
    RequestHandler,
};
pub use error::{ChannelError, Result};
