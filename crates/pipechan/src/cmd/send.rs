use std::fs;
use std::sync::Arc;
use std::time::Duration;

use pipechan_channel::PipeClient;
use pipechan_frame::Frame;
use pipechan_registry::SerializerRegistry;
use pipechan_transport::PipeName;

use crate::cmd::{build_runtime, parse_duration, resolve_name, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name, args.dir.as_deref())?;
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let runtime = build_runtime()?;
    let frame = runtime.block_on(send(&name, args.id, &payload, timeout))?;
    print_response(&frame, name.name(), format);
    Ok(SUCCESS)
}

async fn send(name: &PipeName, id: i32, payload: &[u8], timeout: Duration) -> CliResult<Frame> {
    let exchange = async {
        // Raw requests bypass the registry, so an empty one suffices.
        let mut client = PipeClient::connect(name, Arc::new(SerializerRegistry::new()))
            .await
            .map_err(|err| channel_error("connect failed", err))?;
        let frame = client
            .request_raw(id, payload)
            .await
            .map_err(|err| channel_error("request failed", err))?;
        client
            .close()
            .await
            .map_err(|err| channel_error("close failed", err))?;
        Ok::<_, CliError>(frame)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("no response within {timeout:?}")))?
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
