//! Prune command: one locked retention pass.

use snapvault_clock::Clock;
use snapvault_fs::{prune, Filesystem, PruneResult, Repository};

use super::{log_skipped, CommandResult};
use crate::config::RetentionConfig;
use crate::lock::PidLock;
use crate::logger::Logger;

/// Execute the prune command.
///
/// Takes the pid lock, runs one retention pass and releases the lock even
/// when the pass fails.
pub fn execute_prune<F, C, L>(
    config: &RetentionConfig,
    fs: &F,
    clock: &C,
    logger: &L,
    pid: u32,
) -> CommandResult<PruneResult>
where
    F: Filesystem,
    C: Clock,
    L: Logger,
{
    let lock = PidLock::acquire(fs, &config.pid_file, pid)?;
    let repo = Repository::new(fs, clock, &config.repository);

    let result = prune(&repo, &config.tiers, config.purge);

    if let Err(e) = lock.release() {
        logger.warn(&format!("cannot remove pid file {}: {}", config.pid_file.display(), e));
    }

    let result = result?;
    log_prune_result(logger, &result);
    Ok(result)
}

/// Log what a retention pass did.
pub fn log_prune_result<L: Logger>(logger: &L, result: &PruneResult) {
    log_skipped(logger, &result.skipped);
    for snapshot in &result.marked_obsolete {
        logger.verbose(&format!("obsolete: {}", snapshot.name()));
    }
    for snapshot in &result.purge.purged {
        logger.verbose(&format!("purged: {}", snapshot.name()));
    }
    for failure in &result.purge.failed {
        logger.warn(&format!("{}; will retry on the next pass", failure.error));
    }
    logger.info(&format!(
        "retention: {} kept, {} marked obsolete, {} purged, {} purge failures",
        result.retained.len(),
        result.marked_obsolete.len(),
        result.purge.purged.len(),
        result.purge.failed.len()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandError;
    use crate::lock::LockError;
    use crate::logger::MockLogger;
    use snapvault_clock::MockClock;
    use snapvault_fs::{MockFilesystem, RepoError, RetentionTiers};
    use snapvault_schema::{Snapshot, SnapshotState};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    fn config(purge: bool) -> RetentionConfig {
        RetentionConfig {
            repository: PathBuf::from("/backup"),
            tiers: RetentionTiers::from_lengths(&[Duration::from_secs(3600)]).unwrap(),
            pid_file: PathBuf::from("/run/snapvault.pid"),
            purge,
        }
    }

    fn complete(start: i64) -> Snapshot {
        Snapshot::new(start, start + 30, SnapshotState::Complete)
    }

    fn setup(starts: &[i64]) -> MockFilesystem {
        let fs = MockFilesystem::new();
        fs.add_dir("/run");
        fs.add_dir("/backup/.data");
        for start in starts {
            fs.add_dir(format!("/backup/.data/{}", complete(*start).name()));
        }
        fs
    }

    #[test]
    fn test_prune_keeps_newest_and_releases_lock() {
        let fs = setup(&[NOW - 300, NOW - 200, NOW - 100]);
        let logger = MockLogger::new();

        let result =
            execute_prune(&config(true), &fs, &MockClock::new(NOW), &logger, 10).expect("prune");

        assert_eq!(result.retained, vec![complete(NOW - 100)]);
        assert_eq!(result.purge.purged.len(), 2);
        assert_eq!(fs.dir_names("/backup/.data"), vec![complete(NOW - 100).name()]);
        assert!(!fs.exists(Path::new("/run/snapvault.pid")));
        assert!(logger.contains("1 kept, 2 marked obsolete, 2 purged, 0 purge failures"));
    }

    #[test]
    fn test_prune_logs_failed_removal() {
        let fs = setup(&[NOW - 200, NOW - 100]);
        let purging = Snapshot::new(NOW - 200, NOW - 170, SnapshotState::Purging);
        fs.fail_removal_of(format!("/backup/.data/{}", purging.name()));
        let logger = MockLogger::new();

        let result =
            execute_prune(&config(true), &fs, &MockClock::new(NOW), &logger, 10).expect("prune");

        assert_eq!(result.purge.failed.len(), 1);
        assert!(logger.contains("will retry on the next pass"));
        assert!(fs.is_dir(format!("/backup/.data/{}", purging.name())));
    }

    #[test]
    fn test_prune_refuses_when_locked() {
        let fs = setup(&[]);
        fs.add_file("/run/snapvault.pid", b"99\n".to_vec());

        let err = execute_prune(&config(true), &fs, &MockClock::new(NOW), &MockLogger::new(), 10)
            .unwrap_err();

        assert!(matches!(err, CommandError::Lock(LockError::AlreadyRunning { pid: Some(99), .. })));
    }

    #[test]
    fn test_prune_missing_repository_releases_lock() {
        let fs = MockFilesystem::new();
        fs.add_dir("/run");

        let err = execute_prune(&config(true), &fs, &MockClock::new(NOW), &MockLogger::new(), 10)
            .unwrap_err();

        assert!(matches!(err, CommandError::Repository(RepoError::Unavailable { .. })));
        assert!(!fs.exists(Path::new("/run/snapvault.pid")));
    }

    #[test]
    fn test_prune_logs_skipped_entries() {
        let fs = setup(&[NOW - 100]);
        fs.add_dir("/backup/.data/lost+found");
        let logger = MockLogger::new();

        execute_prune(&config(false), &fs, &MockClock::new(NOW), &logger, 10).expect("prune");

        assert!(logger.contains("ignoring lost+found"));
    }
}
