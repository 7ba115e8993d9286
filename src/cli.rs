//! Command-line argument parsing for the demo binary.
//!
//! A `clap` derive `Args` struct with verbosity/log-file/quiet flags, pared
//! down to what an RPC demo needs — no benchmark-only options like
//! `--percentiles` or `--buffer-size`.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, Subcommand,
};
use std::time::Duration;

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// RPC demo — runs the sum-protocol example as either a server or a client.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Host address to bind (server) or connect to (client)
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// TCP port
    #[arg(long, default_value_t = crate::defaults::DEMO_PORT, global = true)]
    pub port: u16,

    /// Silence all user-facing informational output on stdout
    ///
    /// When this flag is present, only diagnostic logs on stderr will be shown.
    #[arg(short = 'q', long, help_heading = "Output and Logging", global = true)]
    pub quiet: bool,

    /// Increase diagnostic log verbosity on stderr.
    ///
    /// Can be used multiple times to increase detail:
    ///  -v: info
    ///  -vv: debug
    ///  -vvv: trace
    /// By default, only WARNING and ERROR messages are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging", global = true)]
    pub verbose: u8,

    /// Call timeout, e.g. "5s", "500ms"
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub timeout: Duration,

    /// Path for detailed diagnostic logs, or "stderr" to skip the file and
    /// log there instead. Defaults to a daily-rotated file in the working
    /// directory.
    #[arg(long, help_heading = "Output and Logging", global = true)]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the sum-protocol server and accept connections
    Server,
    /// Connect to a running server and call Sum once
    Client {
        /// First operand
        a: i64,
        /// Second operand
        b: i64,
    },
}

/// Parse duration from string (e.g., "10s", "5m", "1h").
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if num < 0.0 {
        return Err("Duration cannot be negative".to_string());
    }

    Ok(match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    })
}
