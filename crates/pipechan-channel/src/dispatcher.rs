use std::future::Future;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use pipechan_registry::Message;
use tokio_util::sync::CancellationToken;

/// Error type handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a request handler.
pub type HandlerResult = std::result::Result<Message, HandlerError>;

/// Per-request information handed to the handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    channel: Arc<str>,
    serializer_id: i32,
    sequence: u64,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(
        channel: Arc<str>,
        serializer_id: i32,
        sequence: u64,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            channel,
            serializer_id,
            sequence,
            cancellation,
        }
    }

    /// Logical name of the channel the request arrived on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Serializer id the request frame was tagged with.
    pub fn serializer_id(&self) -> i32 {
        self.serializer_id
    }

    /// Zero-based index of this request on the connection.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The channel's cancellation signal, for cooperative early exit.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Turns one decoded request into one response.
///
/// Called once per frame; the channel does not read the next frame until the
/// returned future completes. A handler that gives up because the channel
/// is shutting down should fail with [`OperationCancelled`].
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, ctx: RequestContext, request: Message) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter from an async closure to [`RequestHandler`].
pub struct HandlerFn<F> {
    f: F,
}

/// Build a [`RequestHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, request: Message) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(ctx, request))
    }
}

/// Handler outcome signalling it stopped because of cancellation.
///
/// Swallowed as orderly shutdown when the channel's own signal has fired;
/// any other cancellation is surfaced as
/// [`ChannelError::UnexpectedCancellation`](crate::ChannelError::UnexpectedCancellation).
#[derive(Debug, Clone, Copy, Default, thiserror::Error)]
#[error("operation cancelled")]
pub struct OperationCancelled;

pub(crate) fn is_cancellation(err: &HandlerError) -> bool {
    err.downcast_ref::<OperationCancelled>().is_some()
}
