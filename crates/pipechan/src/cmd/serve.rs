use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pipechan_channel::{
    handler_fn, ChannelConfig, ChannelError, HandlerError, PipeChannel, RequestContext,
    RequestHandler,
};
use pipechan_registry::{
    Message, Serializer, SerializerRegistry, UnknownMessage, VoidResponse, VoidResponseSerializer,
};
use pipechan_transport::PipeName;
use tokio_util::sync::CancellationToken;

use crate::cmd::{build_runtime, parse_duration, resolve_name, ServeArgs};
use crate::exit::{channel_error, registry_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::OutputFormat;

/// Opaque payload echoed back verbatim.
#[derive(Debug, Clone, PartialEq)]
struct RawPayload(Bytes);

struct RawSerializer {
    id: i32,
}

impl Serializer for RawSerializer {
    type Value = RawPayload;

    fn id(&self) -> i32 {
        self.id
    }

    fn serialize(&self, value: &RawPayload, out: &mut BytesMut) -> pipechan_registry::Result<()> {
        out.extend_from_slice(&value.0);
        Ok(())
    }

    fn deserialize(&self, input: &mut Bytes) -> pipechan_registry::Result<RawPayload> {
        Ok(RawPayload(input.split_to(input.len())))
    }
}

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name, args.dir.as_deref())?;
    let config = ChannelConfig {
        max_instances: args.max_instances,
        skip_unknown: args.skip_unknown,
        dispose_timeout: parse_duration(&args.dispose_timeout)?,
        ..ChannelConfig::default()
    };
    let registry = build_registry(args.id)?;

    let token = CancellationToken::new();
    install_ctrlc_handler(token.clone())?;

    let runtime = build_runtime()?;
    runtime.block_on(serve(name, registry, config, token))
}

fn build_registry(id: i32) -> CliResult<SerializerRegistry> {
    let mut registry = SerializerRegistry::new();
    registry
        .register(VoidResponseSerializer)
        .map_err(|err| registry_error("registry setup failed", err))?;
    registry.register(RawSerializer { id }).map_err(|_| {
        CliError::new(
            USAGE,
            format!("--id {id} is reserved for the empty response"),
        )
    })?;
    Ok(registry)
}

fn echo_handler() -> impl RequestHandler {
    handler_fn(|ctx: RequestContext, request: Message| async move {
        if let Some(unknown) = request.downcast_ref::<UnknownMessage>() {
            tracing::info!(
                channel = ctx.channel(),
                serializer_id = unknown.serializer_id,
                size = unknown.payload_len,
                "answering unknown request with empty response"
            );
            return Ok(Message::new(VoidResponse));
        }

        let payload = request
            .downcast::<RawPayload>()
            .map_err(|other| format!("unexpected request type {}", other.type_name()))?;
        tracing::info!(
            channel = ctx.channel(),
            serializer_id = ctx.serializer_id(),
            sequence = ctx.sequence(),
            size = payload.0.len(),
            "echoing request"
        );
        Ok::<_, HandlerError>(Message::new(payload))
    })
}

async fn serve(
    name: PipeName,
    registry: SerializerRegistry,
    config: ChannelConfig,
    token: CancellationToken,
) -> CliResult<i32> {
    let mut channel = PipeChannel::create(
        name,
        Arc::new(registry),
        echo_handler(),
        config,
        token,
    )
    .map_err(|err| channel_error("bind failed", err))?;

    match channel.await_connection().await {
        Ok(()) => {}
        Err(ChannelError::Cancelled) => {
            channel
                .dispose()
                .await
                .map_err(|err| channel_error("dispose failed", err))?;
            return Ok(SUCCESS);
        }
        Err(err) => {
            let _ = channel.dispose().await;
            return Err(channel_error("accept failed", err));
        }
    }

    channel.closed().await;
    channel
        .dispose()
        .await
        .map_err(|err| channel_error("channel failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
