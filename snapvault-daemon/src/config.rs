//! Resolved configuration and built-in retention schedules.
//!
//! Parsed arguments are validated once and turned into explicit values
//! handed to the repository, the retention pass and the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use snapvault_fs::{RetentionTiers, TierError};

use crate::cli::{CliError, RetentionArgs, RunArgs};
use crate::copy::CopyTool;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// A named set of tier lengths, newest first, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub name: &'static str,
    pub lengths: &'static [u64],
}

/// Built-in retention schedules.
pub const SCHEDULES: &[Schedule] = &[
    Schedule {
        name: "shortterm",
        lengths: &[10 * MINUTE, 2 * HOUR, DAY, 7 * DAY, 30 * DAY],
    },
    Schedule {
        name: "longterm",
        lengths: &[6 * HOUR, DAY, 7 * DAY, 30 * DAY, 360 * DAY],
    },
    Schedule {
        name: "testing",
        lengths: &[5, 20, 140, 280],
    },
];

impl Schedule {
    /// Look up a built-in schedule by name.
    pub fn find(name: &str) -> Option<&'static Schedule> {
        SCHEDULES.iter().find(|s| s.name == name)
    }

    pub fn tiers(&self) -> Result<RetentionTiers, TierError> {
        let lengths: Vec<Duration> = self.lengths.iter().map(|s| Duration::from_secs(*s)).collect();
        RetentionTiers::from_lengths(&lengths)
    }

    /// Tier lengths in human-readable form, e.g. `6h, 1day, 7days`.
    pub fn describe(&self) -> String {
        self.lengths
            .iter()
            .map(|s| humantime::format_duration(Duration::from_secs(*s)).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Repository and retention settings shared by `run` and `prune`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    pub repository: PathBuf,
    pub tiers: RetentionTiers,
    pub pid_file: PathBuf,
    pub purge: bool,
}

impl RetentionConfig {
    pub fn from_args(args: &RetentionArgs) -> Result<Self, CliError> {
        args.validate()?;
        let tiers = if args.tiers.is_empty() {
            let name = args.schedule_name();
            Schedule::find(name)
                .ok_or_else(|| CliError::UnknownSchedule(name.to_string()))?
                .tiers()?
        } else {
            RetentionTiers::from_lengths(&args.tiers)?
        };

        Ok(Self {
            repository: args.repository.clone(),
            tiers,
            pid_file: args.pid_file.clone(),
            purge: !args.no_purge,
        })
    }

    /// Pause between snapshot cycles: the length of the newest tier.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.tiers.length(0))
    }
}

/// Everything the `run` command needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub origin: PathBuf,
    pub tool: CopyTool,
    pub retention: RetentionConfig,
    pub once: bool,
}

impl Config {
    pub fn from_args(args: &RunArgs) -> Result<Self, CliError> {
        args.validate()?;
        Ok(Self {
            origin: args.origin.clone(),
            tool: CopyTool::new(&args.rsync_path, args.rsync_opts.clone()),
            retention: RetentionConfig::from_args(&args.retention)?,
            once: args.once,
        })
    }
}
