//! Purge worker.
//!
//! Deletes snapshots that retention has marked obsolete. Deletion is two
//! steps, rename to `purging` then remove, so a tree whose removal was cut
//! short is recognisable on the next scan and retried here.

use snapvault_clock::Clock;
use snapvault_schema::{Snapshot, SnapshotState};

use crate::fs::Filesystem;
use crate::repository::{RepoError, Repository};

/// A snapshot whose removal failed; it stays on disk as `purging`.
#[derive(Debug)]
pub struct PurgeFailure {
    pub snapshot: Snapshot,
    pub error: RepoError,
}

/// Result of a purge run.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub purged: Vec<Snapshot>,
    pub failed: Vec<PurgeFailure>,
}

/// Purge every `Obsolete` snapshot and retry every `Purging` one.
///
/// Removal failures are collected and do not stop the run; a failed
/// rename does.
pub fn purge_pending<F: Filesystem, C: Clock>(
    repo: &Repository<F, C>,
) -> Result<PurgeReport, RepoError> {
    let scan = repo.scan()?;
    let mut report = PurgeReport::default();

    let pending = scan
        .snapshots
        .into_vec()
        .into_iter()
        .filter(|sn| matches!(sn.state, SnapshotState::Obsolete | SnapshotState::Purging));

    for mut snapshot in pending {
        match repo.purge(&mut snapshot) {
            Ok(()) => report.purged.push(snapshot),
            Err(error @ RepoError::Remove { .. }) => {
                report.failed.push(PurgeFailure { snapshot, error })
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
