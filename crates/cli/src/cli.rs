//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::ModalityId;
use std::path::PathBuf;

use crate::error::CliError;

/// scrubsync - synchronized scrubbing across multi-modality recordings
#[derive(Parser, Debug)]
#[command(
    name = "scrubsync",
    author,
    version,
    about = "Synchronize and scrub multi-modality recordings",
    long_about = "Aligns independently clocked recordings (cameras, IMUs, insoles, skeleton \n\
                  tracks, burst-sampled sensors) on one reference timeline, applies \n\
                  per-modality offsets and serves decoded video frames through a bounded cache."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SCRUBSYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SCRUBSYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", global = true, env = "SCRUBSYNC_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a session configuration without loading recordings
    Validate(ValidateArgs),

    /// Load recordings and print coverage, anchor and truncated ranges
    Info(InfoArgs),

    /// Resolve every modality at one reference instant
    Resolve(ResolveArgs),

    /// Sweep the navigable range through the session and frame cache
    Scrub(ScrubArgs),

    /// Edit a persisted offsets record
    Offsets(OffsetsArgs),
}

/// Session configuration shared by every command
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to session configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "session.toml",
        env = "SCRUBSYNC_CONFIG"
    )]
    pub config: PathBuf,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Offsets record applied before reporting the anchor
    #[arg(long, env = "SCRUBSYNC_OFFSETS")]
    pub offsets: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `resolve` command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Reference instant (same unit as the timestamps)
    #[arg(long, conflicts_with = "frame", required_unless_present = "frame")]
    pub at: Option<f64>,

    /// Reference frame index
    #[arg(long)]
    pub frame: Option<usize>,

    /// Clamp into the navigable range instead of failing
    #[arg(long)]
    pub clamp: bool,

    /// Offsets record to restore first
    #[arg(long, env = "SCRUBSYNC_OFFSETS")]
    pub offsets: Option<PathBuf>,

    /// Decode the resolved video frames and save them as PNG here
    #[arg(long)]
    pub extract: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `scrub` command
#[derive(Parser, Debug)]
pub struct ScrubArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Reference frames advanced per seek
    #[arg(long, default_value = "1")]
    pub step: usize,

    /// Maximum number of seeks (0 = whole navigable range)
    #[arg(long, default_value = "0")]
    pub limit: u64,

    /// Offsets record to restore first
    #[arg(long, env = "SCRUBSYNC_OFFSETS")]
    pub offsets: Option<PathBuf>,

    /// Sweep timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "SCRUBSYNC_TIMEOUT")]
    pub timeout: u64,
}

/// Arguments for the `offsets` command
#[derive(Parser, Debug)]
pub struct OffsetsArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Offsets record to edit (created when missing)
    #[arg(long)]
    pub file: PathBuf,

    /// Set a key (modality or group) to a value: key=value
    #[arg(long, value_parser = parse_assignment)]
    pub set: Vec<(String, i64)>,

    /// Add to a key's current value: key=delta
    #[arg(long, value_parser = parse_assignment, allow_hyphen_values = true)]
    pub nudge: Vec<(String, i64)>,

    /// Reset a key to zero
    #[arg(long)]
    pub reset: Vec<String>,

    /// Reset every key to zero
    #[arg(long)]
    pub reset_all: bool,

    /// Print the result without writing the record
    #[arg(long)]
    pub dry_run: bool,
}

impl OffsetsArgs {
    pub fn has_edits(&self) -> bool {
        self.reset_all || !self.set.is_empty() || !self.nudge.is_empty() || !self.reset.is_empty()
    }
}

/// Parse `key=value` with a signed integer value
pub fn parse_assignment(s: &str) -> Result<(String, i64), CliError> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| CliError::invalid_assignment(s, "expected key=value"))?;
    let key = key.trim();
    ModalityId::check_name(key).map_err(|e| CliError::invalid_assignment(s, e.to_string()))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| CliError::invalid_assignment(s, e.to_string()))?;
    Ok((key.to_string(), value))
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("camera_2=-12").unwrap(), ("camera_2".into(), -12));
        assert_eq!(parse_assignment(" body = 3 ").unwrap(), ("body".into(), 3));
        assert!(parse_assignment("camera_2").is_err());
        assert!(parse_assignment("=4").is_err());
        assert!(parse_assignment("imu=fast").is_err());
        let err = parse_assignment("left foot=2").unwrap_err();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn test_offsets_command() {
        let cli = Cli::try_parse_from([
            "scrubsync",
            "offsets",
            "-c",
            "s.toml",
            "--file",
            "o.json",
            "--set",
            "imu=4",
            "--nudge",
            "camera_2=-1",
            "--reset",
            "body",
        ])
        .unwrap();
        let Commands::Offsets(args) = cli.command else {
            panic!("expected offsets");
        };
        assert_eq!(args.set, vec![("imu".to_string(), 4)]);
        assert_eq!(args.nudge, vec![("camera_2".to_string(), -1)]);
        assert_eq!(args.reset, vec!["body".to_string()]);
        assert!(args.has_edits());
    }

    #[test]
    fn test_resolve_requires_instant() {
        assert!(Cli::try_parse_from(["scrubsync", "resolve"]).is_err());
        assert!(Cli::try_parse_from(["scrubsync", "resolve", "--at", "1.5", "--frame", "3"]).is_err());
        assert!(Cli::try_parse_from(["scrubsync", "resolve", "--frame", "3"]).is_ok());
    }
}
