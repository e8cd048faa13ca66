use std::path::Path;
use std::sync::Arc;

use pipechan_registry::SerializerRegistry;
use pipechan_transport::{PipeName, UnixDomainSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ChannelConfig;
use crate::connection::Connection;
use crate::dispatcher::RequestHandler;
use crate::error::{ChannelError, Result};
use crate::lifecycle::{join_bounded, ChannelHandle};

/// Observable lifecycle state of a [`PipeChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Bound and waiting for a peer.
    Unconnected,
    /// A peer is connected and the loop is running.
    Connected,
    /// The loop is unwinding or has finished; awaiting `dispose`.
    Draining,
    /// Disposed; the socket is released.
    Closed,
}

/// Server end of a named local channel, serving exactly one peer.
///
/// ```no_run
/// # async fn run() -> pipechan_channel::Result<()> {
/// use std::sync::Arc;
///
/// use pipechan_channel::{handler_fn, ChannelConfig, HandlerError, PipeChannel};
/// use pipechan_registry::{Message, SerializerRegistry, VoidResponse, VoidResponseSerializer};
/// use pipechan_transport::PipeName;
/// use tokio_util::sync::CancellationToken;
///
/// let mut registry = SerializerRegistry::new();
/// registry.register(VoidResponseSerializer)?;
///
/// let handler = handler_fn(|_ctx, _request: Message| async move {
///     Ok::<_, HandlerError>(Message::new(VoidResponse))
/// });
/// let mut channel = PipeChannel::create(
///     PipeName::new("worker")?,
///     Arc::new(registry),
///     handler,
///     ChannelConfig::default(),
///     CancellationToken::new(),
/// )?;
/// channel.await_connection().await?;
/// channel.dispose().await?;
/// # Ok(())
/// # }
/// ```
pub struct PipeChannel {
    name: PipeName,
    label: Arc<str>,
    registry: Arc<SerializerRegistry>,
    handler: Arc<dyn RequestHandler>,
    config: ChannelConfig,
    token: CancellationToken,
    handle: ChannelHandle,
    task: Option<JoinHandle<Result<()>>>,
    loop_done: CancellationToken,
    was_connected: bool,
}

impl PipeChannel {
    /// Bind the channel's socket. No peer is accepted yet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create<H: RequestHandler>(
        name: PipeName,
        registry: Arc<SerializerRegistry>,
        handler: H,
        config: ChannelConfig,
        token: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let socket = UnixDomainSocket::bind_name(&name, config.socket_mode)?;
        info!(
            channel = name.name(),
            path = ?name.path(),
            max_instances = config.max_instances,
            skip_unknown = config.skip_unknown,
            serializers = registry.len(),
            "channel created"
        );

        Ok(Self {
            label: Arc::from(name.name()),
            name,
            registry,
            handler: Arc::new(handler),
            config,
            token,
            handle: ChannelHandle::new(socket),
            task: None,
            loop_done: CancellationToken::new(),
            was_connected: false,
        })
    }

    /// Wait for a peer and start the request loop in the background.
    ///
    /// Returns [`ChannelError::Cancelled`] if the channel's cancellation
    /// signal fires first.
    pub async fn await_connection(&mut self) -> Result<()> {
        if self.handle.is_released() {
            return Err(ChannelError::Closed);
        }
        if self.was_connected {
            return Err(ChannelError::AlreadyConnected);
        }
        let socket = self.handle.socket().ok_or(ChannelError::Closed)?;

        let stream = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!(channel = %self.label, "cancelled while waiting for a peer");
                return Err(ChannelError::Cancelled);
            }
            accepted = socket.accept() => accepted?,
        };

        match stream.peer_credentials() {
            Some((uid, gid, pid)) => {
                info!(channel = %self.label, uid, gid, pid, "peer connected")
            }
            None => info!(channel = %self.label, "peer connected"),
        }

        let connection = Connection::new(
            Arc::clone(&self.label),
            stream,
            Arc::clone(&self.registry),
            Arc::clone(&self.handler),
            self.token.clone(),
            &self.config,
        );
        let done = self.loop_done.clone().drop_guard();
        let task = tokio::spawn(async move {
            let _done = done;
            connection.run().await
        });
        self.handle.attach(task.abort_handle());
        self.task = Some(task);
        self.was_connected = true;
        Ok(())
    }

    /// Wait, bounded by the configured dispose timeout, for the loop to
    /// finish, then release the socket.
    ///
    /// The socket and stream are released whatever the outcome. The loop's
    /// own error, a [`ChannelError::DisposalTimeout`], or a
    /// [`ChannelError::LoopAborted`] is returned after release. Disposing
    /// a channel that never connected only releases the socket. Calling
    /// `dispose` again is a no-op.
    pub async fn dispose(&mut self) -> Result<()> {
        let outcome = match self.task.as_mut() {
            Some(task) if self.was_connected => {
                debug!(
                    channel = %self.label,
                    timeout = ?self.config.dispose_timeout,
                    "waiting for channel loop"
                );
                join_bounded(task, self.config.dispose_timeout).await
            }
            _ => Ok(()),
        };
        self.task = None;
        self.handle.release();

        match &outcome {
            Ok(()) => info!(channel = %self.label, "channel disposed"),
            Err(err) => error!(channel = %self.label, error = %err, "channel disposed after failure"),
        }
        outcome
    }

    /// Resolves once the request loop has exited for any reason.
    ///
    /// Returns immediately if no peer was ever accepted. The loop's outcome
    /// is still reported by [`dispose`](Self::dispose).
    pub async fn closed(&self) {
        if self.was_connected {
            self.loop_done.cancelled().await;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        if self.handle.is_released() {
            return ChannelState::Closed;
        }
        if !self.was_connected {
            return ChannelState::Unconnected;
        }
        if !self.loop_done.is_cancelled() && !self.token.is_cancelled() {
            ChannelState::Connected
        } else {
            ChannelState::Draining
        }
    }

    /// True once a peer has been accepted, even after disposal.
    pub fn was_connected(&self) -> bool {
        self.was_connected
    }

    /// Logical channel name.
    pub fn name(&self) -> &PipeName {
        &self.name
    }

    /// Filesystem path of the socket.
    pub fn path(&self) -> &Path {
        self.name.path()
    }

    /// Configuration the channel was created with.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The channel's cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

impl std::fmt::Debug for PipeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeChannel")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::{BufMut, Bytes, BytesMut};
    use pipechan_frame::{Frame, ReadAccumulator};
    use pipechan_registry::{
        wire, Message, RegistryError, Serializer, UnknownMessage, VoidResponse,
        VoidResponseSerializer,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Notify;

    use super::*;
    use crate::dispatcher::{
        handler_fn, HandlerError, HandlerResult, OperationCancelled, RequestContext,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Pong(u32);

    struct PingSerializer;

    impl Serializer for PingSerializer {
        type Value = Ping;

        fn id(&self) -> i32 {
            1
        }

        fn serialize(&self, value: &Ping, out: &mut BytesMut) -> pipechan_registry::Result<()> {
            out.put_u32_le(value.0);
            Ok(())
        }

        fn deserialize(&self, input: &mut Bytes) -> pipechan_registry::Result<Ping> {
            Ok(Ping(wire::get_i32(input)? as u32))
        }
    }

    struct PongSerializer;

    impl Serializer for PongSerializer {
        type Value = Pong;

        fn id(&self) -> i32 {
            2
        }

        fn serialize(&self, value: &Pong, out: &mut BytesMut) -> pipechan_registry::Result<()> {
            out.put_u32_le(value.0);
            Ok(())
        }

        fn deserialize(&self, input: &mut Bytes) -> pipechan_registry::Result<Pong> {
            Ok(Pong(wire::get_i32(input)? as u32))
        }
    }

    fn test_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/pipechan-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn registry() -> Arc<SerializerRegistry> {
        let mut registry = SerializerRegistry::new();
        registry.register(PingSerializer).expect("ping registers");
        registry.register(PongSerializer).expect("pong registers");
        registry
            .register(VoidResponseSerializer)
            .expect("void registers");
        Arc::new(registry)
    }

    async fn pong_handler(_ctx: RequestContext, request: Message) -> HandlerResult {
        if request.is::<UnknownMessage>() {
            return Ok(Message::new(VoidResponse));
        }
        let ping = request.downcast::<Ping>().map_err(|_| "expected ping")?;
        Ok(Message::new(Pong(ping.0)))
    }

    fn create(
        tag: &str,
        config: ChannelConfig,
        handler: impl RequestHandler,
    ) -> (PipeChannel, PathBuf, CancellationToken) {
        let dir = test_dir(tag);
        let name = PipeName::in_dir(&dir, "chan.sock").expect("name should be valid");
        let token = CancellationToken::new();
        let channel = PipeChannel::create(name, registry(), handler, config, token.clone())
            .expect("channel should bind");
        (channel, dir, token)
    }

    async fn read_frame(stream: &mut pipechan_transport::IpcStream) -> Option<Frame> {
        let mut reader = ReadAccumulator::new();
        let mut buf = [0u8; 64];
        loop {
            let n = stream.read(&mut buf).await.expect("read should succeed");
            if n == 0 {
                return None;
            }
            if let Some(frame) = reader.feed(&buf[..n]).expect("frame should be valid") {
                return Some(frame);
            }
        }
    }

    #[tokio::test]
    async fn ping_pong_byte_exact() {
        let (mut channel, dir, _token) =
            create("pingpong", ChannelConfig::default(), handler_fn(pong_handler));
        assert_eq!(channel.state(), ChannelState::Unconnected);

        let path = channel.path().to_path_buf();
        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 0xEF, 0xBE, 0xAD, 0xDE])
                .await
                .expect("request should write");

            let mut response = [0u8; 12];
            stream
                .read_exact(&mut response)
                .await
                .expect("response should arrive");
            response
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert!(channel.was_connected());

        let response = client.await.expect("client task should finish");
        assert_eq!(response, [8, 0, 0, 0, 2, 0, 0, 0, 0xEF, 0xBE, 0xAD, 0xDE]);

        channel.dispose().await.expect("dispose should succeed");
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn max_instances_is_recorded() {
        let config = ChannelConfig {
            max_instances: 4,
            ..ChannelConfig::default()
        };
        let (mut channel, dir, _token) = create("instances", config, handler_fn(pong_handler));
        assert_eq!(channel.config().max_instances, 4);
        assert_eq!(channel.state(), ChannelState::Unconnected);

        channel.dispose().await.expect("dispose should succeed");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn request_split_across_writes_is_reassembled() {
        let (mut channel, dir, _token) =
            create("split", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            let request = [8u8, 0, 0, 0, 1, 0, 0, 0, 7, 0, 0, 0];
            for chunk in [&request[..2], &request[2..6], &request[6..]] {
                stream.write_all(chunk).await.expect("chunk should write");
                stream.flush().await.expect("flush should succeed");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            read_frame(&mut stream).await.expect("response frame")
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        let frame = client.await.expect("client task should finish");
        assert_eq!(frame.serializer_id, 2);
        assert_eq!(&frame.payload[..], &[7, 0, 0, 0]);

        channel.dispose().await.expect("dispose should succeed");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn blocked_handler_holds_the_next_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let handler = {
            let calls = Arc::clone(&calls);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            handler_fn(move |ctx: RequestContext, request: Message| {
                let calls = Arc::clone(&calls);
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    entered.notify_one();
                    release.notified().await;
                    pong_handler(ctx, request).await
                }
            })
        };
        let (mut channel, dir, _token) = create("halfduplex", ChannelConfig::default(), handler);

        let mut stream = UnixDomainSocket::connect(channel.path())
            .await
            .expect("client should connect");
        channel
            .await_connection()
            .await
            .expect("peer should connect");

        stream
            .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0])
            .await
            .expect("first request should write");
        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .expect("handler should start");

        stream
            .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0])
            .await
            .expect("second request should write");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        let first = read_frame(&mut stream).await.expect("first response");
        assert_eq!(&first.payload[..], &[1, 0, 0, 0]);

        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .expect("second request should dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        release.notify_one();
        let second = read_frame(&mut stream).await.expect("second response");
        assert_eq!(&second.payload[..], &[2, 0, 0, 0]);

        drop(stream);
        channel.dispose().await.expect("dispose should succeed");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_id_yields_sentinel_when_skipping() {
        let config = ChannelConfig {
            skip_unknown: true,
            ..ChannelConfig::default()
        };
        let (mut channel, dir, _token) = create("skip", config, handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[7, 0, 0, 0, 99, 0, 0, 0, 1, 2, 3])
                .await
                .expect("request should write");
            read_frame(&mut stream).await.expect("response frame")
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        let frame = client.await.expect("client should finish");
        assert_eq!(frame.serializer_id, 0);
        assert!(frame.payload.is_empty());

        channel.dispose().await.expect("dispose should succeed");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_id_is_fatal_without_skipping() {
        let (mut channel, dir, _token) =
            create("noskip", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[7, 0, 0, 0, 99, 0, 0, 0, 1, 2, 3])
                .await
                .expect("request should write");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert!(client.await.expect("client should finish").is_none());

        let err = channel.dispose().await.expect_err("loop should fail");
        assert!(matches!(
            err,
            ChannelError::Registry(RegistryError::UnknownSerializerId(99))
        ));
        assert!(!channel.path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn overrun_is_fatal() {
        let (mut channel, dir, _token) =
            create("overrun", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            // Declares a 4-byte body but sends 8 in one write.
            stream
                .write_all(&[4, 0, 0, 0, 1, 0, 0, 0, 9, 9, 9, 9])
                .await
                .expect("request should write");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert!(client.await.expect("client should finish").is_none());

        let err = channel.dispose().await.expect_err("loop should fail");
        assert!(matches!(err, ChannelError::Frame(_)));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn disconnect_mid_frame_is_truncation() {
        let (mut channel, dir, _token) =
            create("truncated", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0])
                .await
                .expect("partial request should write");
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        client.await.expect("client should finish");

        let err = channel.dispose().await.expect_err("loop should fail");
        assert!(matches!(
            err,
            ChannelError::Frame(pipechan_frame::FrameError::Truncated { .. })
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn peer_disconnect_ends_loop_cleanly() {
        let (mut channel, dir, _token) =
            create("disconnect", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            drop(stream);
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        client.await.expect("client should finish");

        channel.dispose().await.expect("clean disconnect is not an error");
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn dispose_times_out_on_stuck_handler_and_still_releases() {
        let entered = Arc::new(Notify::new());
        let handler = {
            let entered = Arc::clone(&entered);
            handler_fn(move |_ctx: RequestContext, _request: Message| {
                let entered = Arc::clone(&entered);
                async move {
                    entered.notify_one();
                    std::future::pending::<()>().await;
                    Ok::<_, HandlerError>(Message::new(VoidResponse))
                }
            })
        };
        let config = ChannelConfig {
            dispose_timeout: Duration::from_millis(50),
            ..ChannelConfig::default()
        };
        let (mut channel, dir, _token) = create("stuck", config, handler);
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0])
                .await
                .expect("request should write");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        entered.notified().await;

        let err = channel.dispose().await.expect_err("dispose should time out");
        assert!(matches!(err, ChannelError::DisposalTimeout(_)));
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.path().exists());

        // The aborted loop drops its stream, so the peer sees EOF.
        assert!(client.await.expect("client should finish").is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn closed_resolves_when_peer_leaves() {
        let (mut channel, dir, _token) =
            create("closed", ChannelConfig::default(), handler_fn(pong_handler));
        channel.closed().await;

        let path = channel.path().to_path_buf();
        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, 0])
                .await
                .expect("request should write");
            read_frame(&mut stream).await.expect("response frame")
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        client.await.expect("client should finish");

        tokio::time::timeout(Duration::from_secs(5), channel.closed())
            .await
            .expect("loop should exit after peer hangs up");
        assert_eq!(channel.state(), ChannelState::Draining);
        channel.dispose().await.expect("dispose should succeed");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn cancellation_unwinds_loop_without_error() {
        let (mut channel, dir, token) =
            create("cancel", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert_eq!(channel.state(), ChannelState::Connected);

        token.cancel();
        assert_eq!(channel.state(), ChannelState::Draining);
        channel.dispose().await.expect("cancellation is not an error");
        assert!(client.await.expect("client should finish").is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn handler_cancellation_from_channel_signal_is_swallowed() {
        let handler = handler_fn(|ctx: RequestContext, _request: Message| async move {
            ctx.cancellation().cancelled().await;
            Err::<Message, HandlerError>(Box::new(OperationCancelled))
        });
        let (mut channel, dir, token) = create("handlercancel", ChannelConfig::default(), handler);
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0])
                .await
                .expect("request should write");
            stream
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        let _stream = client.await.expect("client should finish");
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        channel.dispose().await.expect("expected shutdown is not an error");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn foreign_cancellation_is_unexpected() {
        let handler = handler_fn(|_ctx: RequestContext, _request: Message| async move {
            Err::<Message, HandlerError>(Box::new(OperationCancelled))
        });
        let (mut channel, dir, _token) = create("foreign", ChannelConfig::default(), handler);
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0])
                .await
                .expect("request should write");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert!(client.await.expect("client should finish").is_none());

        let err = channel.dispose().await.expect_err("loop should fail");
        assert!(matches!(err, ChannelError::UnexpectedCancellation));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn handler_failure_ends_loop() {
        let handler = handler_fn(|_ctx: RequestContext, _request: Message| async move {
            Err::<Message, HandlerError>("database unavailable".into())
        });
        let (mut channel, dir, _token) = create("handlerfail", ChannelConfig::default(), handler);
        let path = channel.path().to_path_buf();

        let client = tokio::spawn(async move {
            let mut stream = UnixDomainSocket::connect(&path)
                .await
                .expect("client should connect");
            stream
                .write_all(&[8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0])
                .await
                .expect("request should write");
            read_frame(&mut stream).await
        });

        channel
            .await_connection()
            .await
            .expect("peer should connect");
        assert!(client.await.expect("client should finish").is_none());

        let err = channel.dispose().await.expect_err("loop should fail");
        assert!(matches!(err, ChannelError::Handler(_)));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn await_connection_honors_cancellation() {
        let (mut channel, dir, token) =
            create("acceptcancel", ChannelConfig::default(), handler_fn(pong_handler));
        token.cancel();

        let err = channel
            .await_connection()
            .await
            .expect_err("cancelled accept should fail");
        assert!(matches!(err, ChannelError::Cancelled));
        assert!(!channel.was_connected());

        channel.dispose().await.expect("dispose should succeed");
        assert!(!channel.path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn dispose_before_connection_only_releases() {
        let (mut channel, dir, _token) =
            create("early", ChannelConfig::default(), handler_fn(pong_handler));
        assert!(channel.path().exists());

        channel.dispose().await.expect("dispose should succeed");
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.path().exists());

        channel.dispose().await.expect("second dispose is a no-op");
        let err = channel
            .await_connection()
            .await
            .expect_err("closed channel cannot accept");
        assert!(matches!(err, ChannelError::Closed));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn dropping_channel_releases_socket() {
        let (channel, dir, _token) =
            create("drop", ChannelConfig::default(), handler_fn(pong_handler));
        let path = channel.path().to_path_buf();
        assert!(path.exists());

        drop(channel);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let dir = test_dir("badconfig");
        let name = PipeName::in_dir(&dir, "chan.sock").expect("name should be valid");
        let config = ChannelConfig {
            max_instances: 0,
            ..ChannelConfig::default()
        };
        let err = PipeChannel::create(
            name,
            registry(),
            handler_fn(pong_handler),
            config,
            CancellationToken::new(),
        )
        .expect_err("zero instances should be rejected");
        assert!(matches!(err, ChannelError::InvalidConfig(_)));
        let _ = std::fs::remove_dir_all(dir);
    }
}
