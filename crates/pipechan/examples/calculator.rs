//! Calculator host: serves one peer, answering `Add` with `Sum`.
//!
//! Run with:
//!   cargo run --example calculator
//!
//! The example connects its own client; point another process at the printed
//! socket path to talk to it instead.

use std::sync::Arc;

use pipechan::channel::{handler_fn, ChannelConfig, HandlerError, PipeChannel, PipeClient};
use pipechan::registry::{
    JsonSerializer, Message, SerializerRegistry, VoidResponse, VoidResponseSerializer,
};
use pipechan::transport::PipeName;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sum(i64);

fn registry() -> Result<Arc<SerializerRegistry>, Box<dyn std::error::Error>> {
    let mut registry = SerializerRegistry::new();
    registry.register(VoidResponseSerializer)?;
    registry.register(JsonSerializer::<Add>::new(1))?;
    registry.register(JsonSerializer::<Sum>::new(2))?;
    Ok(Arc::new(registry))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = PipeName::generate()?;
    let handler = handler_fn(|_ctx, request: Message| async move {
        match request.downcast::<Add>() {
            Ok(add) => Ok::<_, HandlerError>(Message::new(Sum(add.a + add.b))),
            Err(_) => Ok(Message::new(VoidResponse)),
        }
    });

    let mut channel = PipeChannel::create(
        name.clone(),
        registry()?,
        handler,
        ChannelConfig::default(),
        CancellationToken::new(),
    )?;
    eprintln!("Listening on {}", channel.path().display());

    let client_name = name.clone();
    let client = tokio::spawn(async move {
        let registry = registry().map_err(|err| err.to_string())?;
        let mut client = PipeClient::connect(&client_name, registry)
            .await
            .map_err(|err| err.to_string())?;
        for (a, b) in [(1, 2), (40, 2), (-7, 7)] {
            let sum: Sum = client
                .request(Add { a, b })
                .await
                .map_err(|err| err.to_string())?;
            eprintln!("{a} + {b} = {}", sum.0);
        }
        client.close().await.map_err(|err| err.to_string())
    });

    channel.await_connection().await?;
    client.await??;
    channel.closed().await;
    channel.dispose().await?;
    Ok(())
}
