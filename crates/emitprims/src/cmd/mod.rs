use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod broadcast;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and print received events.
    Listen(ListenArgs),
    /// Connect and emit a single event.
    Send(SendArgs),
    /// Accept N connections and broadcast one event to all of them.
    Broadcast(BroadcastArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Broadcast(args) => broadcast::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Events to listen for (comma-separated).
    #[arg(long = "event", short = 'e', value_delimiter = ',', required = true)]
    pub events: Vec<String>,
    /// JSON value returned to peers that ask for an acknowledgment.
    #[arg(long, default_value = "\"received\"")]
    pub reply: String,
    /// Exit after receiving N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Event name.
    pub event: String,
    /// JSON argument (repeat for several arguments).
    #[arg(long = "json", value_name = "JSON")]
    pub json: Vec<String>,
    /// Ask the peer to acknowledge and print its reply.
    #[arg(long)]
    pub ack: bool,
    /// Maximum time to wait for the acknowledgment (e.g. 5s, 500ms).
    #[arg(long, env = "EMITPRIMS_ACK_TIMEOUT", default_value = "5s")]
    pub ack_timeout: String,
}

#[derive(Args, Debug)]
pub struct BroadcastArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Event name.
    pub event: String,
    /// JSON argument (repeat for several arguments).
    #[arg(long = "json", value_name = "JSON")]
    pub json: Vec<String>,
    /// Number of connections to accept before broadcasting.
    #[arg(long, default_value = "1")]
    pub peers: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_json_args(raw: &[String]) -> CliResult<Vec<Value>> {
    raw.iter()
        .map(|text| parse_json_value("--json", text))
        .collect()
}

pub(crate) fn parse_json_value(flag: &str, text: &str) -> CliResult<Value> {
    serde_json::from_str(text)
        .map_err(|err| CliError::new(USAGE, format!("{flag} is not valid JSON: {err}")))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
