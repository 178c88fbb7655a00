//! Command orchestration for CLI subcommands.
//!
//! Provides execute functions for:
//! - `run` - snapshot loop with retention
//! - `prune` - one retention pass
//! - `list` - print the repository contents
//! - `schedules` - print the built-in schedules

pub mod list;
pub mod prune;
pub mod run;
pub mod schedules;

pub use list::{execute_list, SnapshotRecord};
pub use prune::{execute_prune, log_prune_result};
pub use run::{execute_run, RunSummary};
pub use schedules::execute_schedules;

use snapvault_fs::{RepoError, SkippedEntry};
use thiserror::Error;

use crate::cli::CliError;
use crate::copy::OrchestratorError;
use crate::lock::LockError;
use crate::logger::Logger;

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CliError),

    #[error("repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("{0}")]
    Lock(#[from] LockError),

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] OrchestratorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of command execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Log directories a scan could not use.
pub(crate) fn log_skipped<L: Logger>(logger: &L, skipped: &[SkippedEntry]) {
    for entry in skipped {
        logger.warn(&format!("ignoring {}: {}", entry.name, entry.reason));
    }
}
