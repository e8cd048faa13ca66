use std::any::Any;
use std::sync::Arc;

use bytes::BytesMut;
use pipechan_frame::{encode_frame, Frame, ReadAccumulator, WriteAccumulator};
use pipechan_registry::{Message, SerializerRegistry};
use pipechan_transport::{IpcStream, PipeName, UnixDomainSocket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::config::DEFAULT_READ_BUFFER_CAPACITY;
use crate::error::{ChannelError, Result};

/// Client end of a channel: sends one request and waits for its response.
pub struct PipeClient {
    stream: IpcStream,
    registry: Arc<SerializerRegistry>,
    reader: ReadAccumulator,
    writer: WriteAccumulator,
    buf: Vec<u8>,
}

impl PipeClient {
    /// Connect to a listening channel.
    pub async fn connect(name: &PipeName, registry: Arc<SerializerRegistry>) -> Result<Self> {
        let stream = UnixDomainSocket::connect(name.path()).await?;
        debug!(channel = name.name(), "client connected");
        Ok(Self::from_stream(stream, registry))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: IpcStream, registry: Arc<SerializerRegistry>) -> Self {
        Self {
            stream,
            registry,
            reader: ReadAccumulator::new(),
            writer: WriteAccumulator::new(),
            buf: vec![0u8; DEFAULT_READ_BUFFER_CAPACITY],
        }
    }

    /// Send a pre-serialized payload and return the raw response frame.
    pub async fn request_raw(&mut self, serializer_id: i32, payload: &[u8]) -> Result<Frame> {
        let mut out = BytesMut::new();
        encode_frame(serializer_id, payload, &mut out)?;
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    /// Send a message and decode the response through the registry.
    pub async fn request_reply(&mut self, request: Message) -> Result<Message> {
        self.writer.reset();
        let id = self.registry.encode(&request, &mut self.writer)?;
        let bytes = self.writer.finish(id)?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;

        let frame = self.read_response().await?;
        Ok(self.registry.decode(frame, false)?)
    }

    /// Typed request: fails with [`ChannelError::UnexpectedResponse`] if the
    /// peer answers with another type.
    pub async fn request<Req, Resp>(&mut self, request: Req) -> Result<Resp>
    where
        Req: Any + Send,
        Resp: Any,
    {
        let response = self.request_reply(Message::new(request)).await?;
        response
            .downcast::<Resp>()
            .map_err(|other| ChannelError::UnexpectedResponse {
                expected: std::any::type_name::<Resp>(),
                actual: other.type_name(),
            })
    }

    /// Shut down the write side, signalling end of requests to the server.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Frame> {
        loop {
            let n = self.stream.read(&mut self.buf).await?;
            if n == 0 {
                self.reader.finish()?;
                return Err(ChannelError::Disconnected);
            }
            if let Some(frame) = self.reader.feed(&self.buf[..n])? {
                return Ok(frame);
            }
        }
    }
}
