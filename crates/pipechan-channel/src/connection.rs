use std::sync::Arc;

use pipechan_frame::{Frame, ReadAccumulator, WriteAccumulator};
use pipechan_registry::{SerializerRegistry, UnknownMessage};
use pipechan_transport::IpcStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::dispatcher::{is_cancellation, RequestContext, RequestHandler};
use crate::error::{ChannelError, Result};

/// The connected half of a channel: one stream, one request in flight.
pub(crate) struct Connection {
    channel: Arc<str>,
    stream: IpcStream,
    registry: Arc<SerializerRegistry>,
    handler: Arc<dyn RequestHandler>,
    token: CancellationToken,
    skip_unknown: bool,
    read_buffer_capacity: usize,
    reader: ReadAccumulator,
    writer: WriteAccumulator,
}

impl Connection {
    pub(crate) fn new(
        channel: Arc<str>,
        stream: IpcStream,
        registry: Arc<SerializerRegistry>,
        handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
        config: &ChannelConfig,
    ) -> Self {
        Self {
            channel,
            stream,
            registry,
            handler,
            token,
            skip_unknown: config.skip_unknown,
            read_buffer_capacity: config.read_buffer_capacity,
            reader: ReadAccumulator::with_max_frame_size(config.max_frame_size),
            writer: WriteAccumulator::with_max_frame_size(config.max_frame_size),
        }
    }

    /// Read, dispatch and answer frames until the peer disconnects, the
    /// channel is cancelled, or a fatal error occurs.
    ///
    /// Cancellation and a disconnect on a frame boundary both end with `Ok`.
    pub(crate) async fn run(self) -> Result<()> {
        let channel = Arc::clone(&self.channel);
        let outcome = self.serve().await;
        if let Err(err) = &outcome {
            error!(channel = %channel, error = %err, "channel loop failed");
        }
        outcome
    }

    async fn serve(mut self) -> Result<()> {
        let mut buf = vec![0u8; self.read_buffer_capacity];
        let mut sequence: u64 = 0;

        loop {
            if self.token.is_cancelled() {
                debug!(channel = %self.channel, "cancellation requested, leaving loop");
                return Ok(());
            }

            let n = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(channel = %self.channel, "cancelled while waiting for data");
                    return Ok(());
                }
                read = self.stream.read(&mut buf) => read?,
            };

            if n == 0 {
                self.reader.finish()?;
                info!(channel = %self.channel, requests = sequence, "peer disconnected");
                return Ok(());
            }

            trace!(channel = %self.channel, bytes = n, "read chunk");
            let Some(frame) = self.reader.feed(&buf[..n])? else {
                continue;
            };

            if !self.dispatch(frame, sequence).await? {
                return Ok(());
            }
            sequence += 1;
        }
    }

    /// Handle one complete frame. Returns `false` if the handler stopped
    /// because the channel is shutting down.
    async fn dispatch(&mut self, frame: Frame, sequence: u64) -> Result<bool> {
        let serializer_id = frame.serializer_id;
        let request = self.registry.decode(frame, self.skip_unknown)?;
        if let Some(unknown) = request.downcast_ref::<UnknownMessage>() {
            warn!(
                channel = %self.channel,
                serializer_id = unknown.serializer_id,
                payload_len = unknown.payload_len,
                "dispatching unknown message"
            );
        }

        let ctx = RequestContext::new(
            Arc::clone(&self.channel),
            serializer_id,
            sequence,
            self.token.clone(),
        );
        let response = match self.handler.handle(ctx, request).await {
            Ok(response) => response,
            Err(err) if is_cancellation(&err) => {
                if self.token.is_cancelled() {
                    debug!(channel = %self.channel, sequence, "handler stopped for shutdown");
                    return Ok(false);
                }
                return Err(ChannelError::UnexpectedCancellation);
            }
            Err(err) => return Err(ChannelError::Handler(err)),
        };

        let response_id = self.registry.encode(&response, &mut self.writer)?;
        let bytes = self.writer.finish(response_id)?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        debug!(
            channel = %self.channel,
            sequence,
            request_id = serializer_id,
            response_id,
            "request answered"
        );

        self.writer.reset();
        self.reader.reset();
        Ok(true)
    }
}
