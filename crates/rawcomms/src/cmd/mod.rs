use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rawcomms_frame::{CancellationToken, FrameConfig, TruncationPolicy};

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo each transmission back.
    Echo(EchoArgs),
    /// Send a single transmission.
    Send(SendArgs),
    /// Accept connections and print received transmissions.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Per-transmission receive/send timeout (e.g. 5s, 500ms). Default: none.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Decode whatever arrived when a peer hangs up mid-payload.
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port).
    pub addr: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Agent name written to the metadata header.
    #[arg(long, default_value = "rawcomms")]
    pub agent: String,
    /// Endpoint written to the metadata header.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub endpoint: i64,
    /// Additional data written to the metadata header.
    #[arg(long, default_value = "")]
    pub addl: String,
    /// Connect, send and (with --wait) receive timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Wait for one reply transmission and print it.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Exit after receiving N transmissions.
    #[arg(long)]
    pub count: Option<usize>,
    /// Per-transmission receive timeout (e.g. 5s, 500ms). Default: none.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Decode whatever arrived when a peer hangs up mid-payload.
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `<n>ms`, `<n>s` or bare seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse an optional timeout flag; absent means wait indefinitely.
pub fn receive_timeout(input: Option<&str>) -> CliResult<Duration> {
    match input {
        Some(text) => parse_duration(text),
        None => Ok(Duration::MAX),
    }
}

pub fn frame_config(lenient: bool) -> FrameConfig {
    FrameConfig {
        truncation: if lenient {
            TruncationPolicy::Lenient
        } else {
            TruncationPolicy::Strict
        },
        ..FrameConfig::default()
    }
}

/// Cancel the returned token on Ctrl-C.
///
/// A blocked `accept` is not interruptible, so the handler also dials the
/// listener once to wake it.
pub fn install_shutdown(local_addr: SocketAddr) -> CliResult<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let wake = wake_addr(local_addr);

    ctrlc::set_handler(move || {
        trigger.cancel();
        let _ = TcpStream::connect_timeout(&wake, Duration::from_millis(200));
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    Ok(token)
}

fn wake_addr(local_addr: SocketAddr) -> SocketAddr {
    match local_addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from(([127, 0, 0, 1], v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}
