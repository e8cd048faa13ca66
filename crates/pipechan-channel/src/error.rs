use std::time::Duration;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipechan_transport::TransportError),

    /// Frame-level protocol violation. The connection is dropped.
    #[error("frame error: {0}")]
    Frame(#[from] pipechan_frame::FrameError),

    /// Serializer registration or resolution error.
    #[error("serializer error: {0}")]
    Registry(#[from] pipechan_registry::RegistryError),

    /// I/O error on the connected stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request handler failed.
    #[error("request handler failed: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// The channel's own cancellation signal fired while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// A cancellation that did not come from the channel's own signal.
    #[error("unexpected cancellation from outside the channel")]
    UnexpectedCancellation,

    /// The loop did not finish within the disposal bound.
    #[error("channel loop did not exit within {0:?}; peer never closed its side")]
    DisposalTimeout(Duration),

    /// The loop task panicked or was aborted.
    #[error("channel loop terminated abnormally: {0}")]
    LoopAborted(String),

    /// A connection was already accepted on this channel.
    #[error("channel already connected")]
    AlreadyConnected,

    /// The channel was disposed and its socket released.
    #[error("channel closed")]
    Closed,

    /// The peer closed the stream before a response arrived.
    #[error("peer disconnected")]
    Disconnected,

    /// A response arrived with a type other than the one requested.
    #[error("unexpected response type {actual}, expected {expected}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    /// Configuration rejected at construction.
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
