//! Run command: the snapshot loop.
//!
//! Each cycle takes a snapshot linked against the newest complete one,
//! then runs a retention pass. Cycles repeat at the cadence of the newest
//! retention tier until a termination signal arrives or `--once` is set.

use snapvault_clock::Clock;
use snapvault_fs::{prune, Filesystem, Repository};

use super::{log_prune_result, log_skipped, CommandResult};
use crate::config::Config;
use crate::copy::{CopyRunner, Orchestrator, SnapshotOutcome};
use crate::lock::PidLock;
use crate::logger::Logger;
use crate::signal::ShutdownFlag;

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub completed: u64,
    pub deferred: u64,
}

/// Execute the run command.
///
/// A termination signal during a copy is forwarded to the copy tool and
/// ends the run with a cancellation error. A signal between cycles ends
/// the run cleanly.
pub async fn execute_run<F, C, L>(
    config: &Config,
    fs: &F,
    clock: &C,
    logger: &L,
    shutdown: &ShutdownFlag,
    runner: CopyRunner<L>,
    pid: u32,
) -> CommandResult<RunSummary>
where
    F: Filesystem,
    C: Clock,
    L: Logger + Clone + 'static,
{
    let lock = PidLock::acquire(fs, &config.retention.pid_file, pid)?;
    logger.debug(&format!("pid lock {} acquired", lock.path().display()));

    let result = run_cycles(config, fs, clock, logger, shutdown, runner).await;

    if let Err(e) = lock.release() {
        logger.warn(&format!(
            "cannot remove pid file {}: {}",
            config.retention.pid_file.display(),
            e
        ));
    }
    result
}

async fn run_cycles<F, C, L>(
    config: &Config,
    fs: &F,
    clock: &C,
    logger: &L,
    shutdown: &ShutdownFlag,
    runner: CopyRunner<L>,
) -> CommandResult<RunSummary>
where
    F: Filesystem,
    C: Clock,
    L: Logger + Clone + 'static,
{
    let repo = Repository::new(fs, clock, &config.retention.repository);
    let orchestrator =
        Orchestrator::new(&repo, &config.tool, &config.origin, logger.clone()).with_runner(runner);
    let cadence = config.retention.cadence();
    let mut summary = RunSummary::default();

    loop {
        if shutdown.should_stop() {
            logger.info("shutdown requested, stopping");
            break;
        }

        repo.ensure_layout()?;
        let scan = repo.scan()?;
        log_skipped(logger, &scan.skipped);
        let base = scan.snapshots.last_good().cloned();
        match &base {
            Some(base) => logger.verbose(&format!("link base: {}", base.name())),
            None => logger.verbose("no complete snapshot yet, copying without link base"),
        }

        match orchestrator.create_snapshot(base.as_ref(), shutdown).await? {
            SnapshotOutcome::Completed(_) => summary.completed += 1,
            SnapshotOutcome::Deferred { .. } => summary.deferred += 1,
        }

        let pruned = prune(&repo, &config.retention.tiers, config.retention.purge)?;
        log_prune_result(logger, &pruned);
        summary.cycles += 1;

        if config.once {
            break;
        }

        logger.verbose(&format!(
            "next snapshot in {}",
            humantime::format_duration(cadence)
        ));
        tokio::select! {
            _ = tokio::time::sleep(cadence) => {}
            termination = shutdown.wait() => {
                logger.info(&format!("received {}, stopping", termination));
                break;
            }
        }
    }

    Ok(summary)
}
