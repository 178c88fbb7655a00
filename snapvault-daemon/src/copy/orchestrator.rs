//! Snapshot creation: drive one snapshot from incomplete to complete.

use std::path::PathBuf;

use snapvault_clock::Clock;
use snapvault_fs::{Filesystem, LinkUpdate, RepoError, Repository};
use snapvault_schema::Snapshot;
use thiserror::Error;

use super::command::{transient_reason, CopyTool};
use super::runner::{CopyError, CopyExit, CopyRunner};
use crate::logger::Logger;
use crate::signal::{ShutdownFlag, Termination};

/// Errors that end a snapshot attempt. The snapshot stays incomplete on disk.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error("copy tool exited with code {code}; snapshot {name} left incomplete")]
    CopyFailed { name: String, code: i32 },

    #[error("copy tool killed by signal {signal}; snapshot {name} left incomplete")]
    CopyKilled { name: String, signal: i32 },

    #[error("copy cancelled by {termination}; snapshot {name} left incomplete")]
    Cancelled {
        name: String,
        termination: Termination,
    },
}

/// A snapshot attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The copy succeeded and the snapshot is complete.
    Completed(Snapshot),
    /// The copy hit a transient error; the snapshot stays incomplete and is
    /// reused by the next attempt.
    Deferred {
        snapshot: Snapshot,
        code: i32,
        reason: &'static str,
    },
}

/// Creates snapshots of `origin` inside a repository.
pub struct Orchestrator<'a, F: Filesystem, C: Clock, L: Logger + Clone + 'static> {
    repo: &'a Repository<F, C>,
    tool: &'a CopyTool,
    origin: PathBuf,
    runner: CopyRunner<L>,
    logger: L,
}

impl<'a, F: Filesystem, C: Clock, L: Logger + Clone + 'static> Orchestrator<'a, F, C, L> {
    pub fn new(
        repo: &'a Repository<F, C>,
        tool: &'a CopyTool,
        origin: impl Into<PathBuf>,
        logger: L,
    ) -> Self {
        Self {
            repo,
            tool,
            origin: origin.into(),
            runner: CopyRunner::new(logger.clone()),
            logger,
        }
    }

    /// Replace the copy runner (to shorten the kill grace period).
    pub fn with_runner(mut self, runner: CopyRunner<L>) -> Self {
        self.runner = runner;
        self
    }

    /// Copy the origin into a new snapshot, hard-linking against `link_base`.
    ///
    /// A leftover incomplete snapshot is restarted under the current time and
    /// reused as the target; otherwise a fresh one is created. The snapshot
    /// directory exists on disk before the copy tool starts.
    pub async fn create_snapshot(
        &self,
        link_base: Option<&Snapshot>,
        shutdown: &ShutdownFlag,
    ) -> Result<SnapshotOutcome, OrchestratorError> {
        self.repo.ensure_layout()?;
        let mut snapshot = self.prepare_target()?;

        let base_path = link_base.map(|base| self.repo.path_of(base));
        let invocation = self.tool.invocation(
            &self.origin,
            &self.repo.path_of(&snapshot),
            base_path.as_deref(),
            &self.repo.data_dir(),
        );
        self.logger.info(&format!("run: {}", invocation.display()));

        match self.runner.run(&invocation, shutdown).await? {
            CopyExit::Success => {
                if let LinkUpdate::Failed(e) = self.repo.complete(&mut snapshot)? {
                    self.logger.warn(&format!("cannot update latest link: {}", e));
                }
                self.logger.info(&format!("finished: {}", snapshot.name()));
                Ok(SnapshotOutcome::Completed(snapshot))
            }
            CopyExit::Failed(code) => match transient_reason(code) {
                Some(reason) => {
                    self.logger.warn(&format!(
                        "copy tool exited with transient error {} ({}); {} kept for the next run",
                        code,
                        reason,
                        snapshot.name()
                    ));
                    Ok(SnapshotOutcome::Deferred {
                        snapshot,
                        code,
                        reason,
                    })
                }
                None => Err(OrchestratorError::CopyFailed {
                    name: snapshot.name(),
                    code,
                }),
            },
            CopyExit::Signalled(signal) => Err(OrchestratorError::CopyKilled {
                name: snapshot.name(),
                signal,
            }),
            CopyExit::Cancelled(termination) => Err(OrchestratorError::Cancelled {
                name: snapshot.name(),
                termination,
            }),
        }
    }

    fn prepare_target(&self) -> Result<Snapshot, RepoError> {
        let scan = self.repo.scan()?;
        match scan.snapshots.last_incomplete().cloned() {
            Some(mut leftover) => {
                let old = leftover.name();
                self.repo.restart(&mut leftover)?;
                self.logger
                    .info(&format!("reusing incomplete snapshot {} as {}", old, leftover.name()));
                Ok(leftover)
            }
            None => {
                let snapshot = self.repo.create_incomplete()?;
                self.logger.verbose(&format!("created {}", snapshot.name()));
                Ok(snapshot)
            }
        }
    }
}
