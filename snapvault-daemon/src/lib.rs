//! snapvault daemon.
//!
//! This crate provides the `snapvault` command-line tool: argument parsing
//! and validation, the copy orchestrator driving rsync, the snapshot loop,
//! retention commands, logging, signal handling and the pid lock.

pub mod cli;
pub mod commands;
pub mod config;
pub mod copy;
pub mod exit;
pub mod lock;
pub mod logger;
pub mod signal;

pub use cli::{parse_from, Cli, CliError, Command, ListArgs, PruneArgs, RetentionArgs, RunArgs};
pub use commands::{
    execute_list, execute_prune, execute_run, execute_schedules, CommandError, CommandResult,
    RunSummary,
};
pub use config::{Config, RetentionConfig, Schedule, SCHEDULES};
pub use copy::{
    CopyError, CopyExit, CopyRunner, CopyTool, Orchestrator, OrchestratorError, SnapshotOutcome,
};
pub use lock::{LockError, PidLock};
pub use logger::{Level, Logger, MockLogger, StderrLogger};
pub use signal::{ShutdownFlag, Termination};
