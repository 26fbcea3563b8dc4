use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use earlink_session::SessionConfig;

use crate::exit::{session_error, CliResult};
use crate::output::OutputFormat;

pub mod classify;
pub mod decode;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a raw capture file and print samples.
    Decode(DecodeArgs),
    /// Classify a device status line and extract its protocol version.
    Classify(ClassifyArgs),
    /// Stream samples from serial devices until Ctrl-C.
    Stream(StreamArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<PathBuf>) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format, &load_config(config)?),
        Command::Classify(args) => classify::run(args, format, &load_config(config)?),
        Command::Stream(args) => stream::run(args, format, load_config(config)?),
        Command::Version(args) => version::run(args),
    }
}

fn load_config(path: Option<PathBuf>) -> CliResult<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(&path).map_err(|err| session_error("load config", err)),
        None => Ok(SessionConfig::default()),
    }
}

/// How the capture was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Concatenated wireless notification payloads.
    Wireless,
    /// Raw serial byte stream.
    Serial,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to replay.
    pub file: PathBuf,
    /// Transport the capture was recorded from.
    #[arg(long, value_enum, default_value = "wireless")]
    pub transport: TransportKind,
    /// Protocol version reported by the device (wireless only).
    #[arg(long, default_value = "3", allow_negative_numbers = true)]
    pub protocol_version: i32,
    /// Notification size used to replay a wireless capture.
    #[arg(long, default_value = "244", value_parser = clap::value_parser!(u16).range(2..))]
    pub chunk_size: u16,
    /// Stop after N samples.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Status text as received from the device.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Serial device of the left earbud.
    pub device: PathBuf,
    /// Serial device of the right earbud; streams both as one session.
    #[arg(long, value_name = "DEVICE")]
    pub right: Option<PathBuf>,
    /// Configuration command sent before streaming starts.
    #[arg(long, value_name = "COMMAND")]
    pub config_command: Option<String>,
    /// Exit after N samples.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
