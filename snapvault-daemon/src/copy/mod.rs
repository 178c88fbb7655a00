//! Copy orchestration.
//!
//! - `command` - copy tool command line and transient exit codes
//! - `runner` - child process supervision and signal forwarding
//! - `orchestrator` - snapshot creation around a copy run

pub mod command;
pub mod orchestrator;
pub mod runner;

pub use command::{
    transient_reason, CopyInvocation, CopyTool, DEFAULT_RSYNC_PATH, TRANSIENT_EXIT_CODES,
};
pub use orchestrator::{Orchestrator, OrchestratorError, SnapshotOutcome};
pub use runner::{CopyError, CopyExit, CopyRunner, DEFAULT_GRACE, OUTPUT_PREFIX};
