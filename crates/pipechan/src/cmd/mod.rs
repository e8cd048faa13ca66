use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use pipechan_transport::PipeName;

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve one peer, echoing each request back under its serializer id.
    Serve(ServeArgs),
    /// Send a single request and print the response.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Logical channel name.
    pub name: String,
    /// Directory for the socket instead of the per-user runtime directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Serializer id the echo payload is registered under.
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    pub id: i32,
    /// Answer unregistered serializer ids with an empty response instead of
    /// dropping the connection.
    #[arg(long)]
    pub skip_unknown: bool,
    /// Server instances allowed for this name.
    #[arg(long, default_value = "1")]
    pub max_instances: usize,
    /// Upper bound on the wait for the loop at shutdown (e.g. 90s, 500ms).
    #[arg(long, default_value = "90s")]
    pub dispose_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Logical channel name.
    pub name: String,
    /// Directory holding the socket instead of the per-user runtime directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Serializer id to tag the request with.
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    pub id: i32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Maximum time to wait for connect and response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn resolve_name(name: &str, dir: Option<&Path>) -> CliResult<PipeName> {
    let resolved = match dir {
        Some(dir) => PipeName::in_dir(dir, name),
        None => PipeName::new(name),
    };
    resolved.map_err(|err| transport_error("invalid channel name", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn build_runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}
