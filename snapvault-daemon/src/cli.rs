//! CLI argument parsing for snapvault.
//!
//! Provides the command-line interface for the `snapvault` binary with
//! run, prune, list and schedules subcommands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use snapvault_fs::TierError;
use snapvault_schema::SnapshotState;
use thiserror::Error;

use crate::copy::DEFAULT_RSYNC_PATH;

/// Default pid file guarding against concurrent instances.
pub const DEFAULT_PID_FILE: &str = "/var/run/snapvault.pid";

/// Retention schedule used when neither `--schedule` nor `--tiers` is given.
pub const DEFAULT_SCHEDULE: &str = "longterm";

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("--{flag} must be an absolute path, got {}", path.display())]
    RelativePath { flag: &'static str, path: PathBuf },

    #[error("origin and repository must differ, both are {}", .0.display())]
    SameOriginAndRepository(PathBuf),

    #[error("unknown schedule {0:?}, run `snapvault schedules` for the list")]
    UnknownSchedule(String),

    #[error("invalid retention tiers: {0}")]
    Tiers(#[from] TierError),
}

/// snapvault - incremental, hard-link deduplicated snapshots driven by rsync.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "snapvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log output (-v shows copy tool output, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Take snapshots on the schedule's cadence and apply retention.
    Run(RunArgs),
    /// Apply retention once: mark superseded snapshots obsolete and purge them.
    Prune(PruneArgs),
    /// List the snapshots in a repository.
    List(ListArgs),
    /// Print the built-in retention schedules.
    Schedules,
}

/// Repository and retention options shared by `run` and `prune`.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RetentionArgs {
    /// Repository root; snapshots live in its `.data` directory.
    #[arg(long)]
    pub repository: PathBuf,

    /// Built-in retention schedule.
    #[arg(long, conflicts_with = "tiers")]
    pub schedule: Option<String>,

    /// Custom tier lengths, newest first (e.g. `1h,1d,7d`).
    #[arg(long, value_delimiter = ',', value_parser = parse_tier)]
    pub tiers: Vec<Duration>,

    /// Pid file guarding against a second instance.
    #[arg(long, default_value = DEFAULT_PID_FILE)]
    pub pid_file: PathBuf,

    /// Mark snapshots obsolete but never delete them.
    #[arg(long)]
    pub no_purge: bool,
}

impl RetentionArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        require_absolute("repository", &self.repository)
    }

    /// The selected schedule name, if no custom tiers were given.
    pub fn schedule_name(&self) -> &str {
        self.schedule.as_deref().unwrap_or(DEFAULT_SCHEDULE)
    }
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Source tree to snapshot.
    #[arg(long)]
    pub origin: PathBuf,

    #[command(flatten)]
    pub retention: RetentionArgs,

    /// Copy tool executable.
    #[arg(long, default_value = DEFAULT_RSYNC_PATH)]
    pub rsync_path: PathBuf,

    /// Extra option passed to the copy tool (repeatable).
    #[arg(long = "rsync-opt", allow_hyphen_values = true)]
    pub rsync_opts: Vec<String>,

    /// Take one snapshot, apply retention and exit.
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        self.retention.validate()?;
        require_absolute("origin", &self.origin)?;
        if self.origin == self.retention.repository {
            return Err(CliError::SameOriginAndRepository(self.origin.clone()));
        }
        Ok(())
    }
}

/// Arguments for the prune command.
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct PruneArgs {
    #[command(flatten)]
    pub retention: RetentionArgs,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ListArgs {
    /// Repository root.
    #[arg(long)]
    pub repository: PathBuf,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Only list snapshots in this state.
    #[arg(long, value_parser = parse_state)]
    pub state: Option<SnapshotState>,
}

impl ListArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        require_absolute("repository", &self.repository)
    }
}

fn require_absolute(flag: &'static str, path: &Path) -> Result<(), CliError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(CliError::RelativePath {
            flag,
            path: path.to_path_buf(),
        })
    }
}

fn parse_tier(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim()).map_err(|e| format!("invalid tier length {:?}: {}", s, e))
}

fn parse_state(s: &str) -> Result<SnapshotState, String> {
    s.parse::<SnapshotState>().map_err(|e| e.to_string())
}

/// Parse CLI arguments from an iterator of strings.
/// Useful for testing.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
