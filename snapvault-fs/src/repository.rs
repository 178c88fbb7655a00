//! Snapshot repository: the destination tree as the only source of truth.
//!
//! Snapshots live as directories under `<root>/.data/`, each named by its
//! encoded `(start, end, state)`. Every state transition is a single rename,
//! and every read re-parses the listing, so nothing is cached between calls.

use std::fmt;
use std::path::{Path, PathBuf};

use snapvault_clock::Clock;
use snapvault_schema::{NameError, Snapshot, SnapshotState};
use thiserror::Error;

use crate::fs::{Filesystem, FsError};

/// Subdirectory of the repository root holding snapshot directories.
pub const DATA_SUBDIR: &str = ".data";

/// Name of the convenience symlink at the repository root.
pub const LATEST_LINK: &str = "latest";

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository {} is unavailable: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("cannot create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("snapshot {name} cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: SnapshotState,
        to: SnapshotState,
    },

    #[error("clock reads {now}, before the start of snapshot {name}")]
    ClockSkew { name: String, now: i64 },

    #[error("renaming snapshot {from} to {to} failed: {source}")]
    Transition {
        from: String,
        to: String,
        #[source]
        source: FsError,
    },

    #[error("removing snapshot {name} failed: {source}")]
    Remove {
        name: String,
        #[source]
        source: FsError,
    },
}

/// Why a directory entry was left out of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The name does not decode as a snapshot.
    Malformed(NameError),
    /// The start time lies after the clock's "now".
    FutureStart { start: i64, now: i64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Malformed(e) => write!(f, "{}", e),
            SkipReason::FutureStart { start, now } => {
                write!(f, "start time {} is in the future (now {})", start, now)
            }
        }
    }
}

/// A directory that looked like a candidate but was not a usable snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

/// Outcome of a symlink update; failures never abort a transition.
#[derive(Debug)]
pub enum LinkUpdate {
    Updated,
    Failed(FsError),
}

/// Snapshots ordered by start time ascending, ties broken by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotCollection {
    snapshots: Vec<Snapshot>,
}

impl SnapshotCollection {
    /// Build a collection, establishing the ordering.
    pub fn new(mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name().cmp(&b.name())));
        Self { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn into_vec(self) -> Vec<Snapshot> {
        self.snapshots
    }

    /// Snapshots in `state`.
    pub fn with_state(&self, state: SnapshotState) -> Self {
        self.filter(|sn| sn.state == state)
    }

    /// Snapshots whose start falls in the half-open window `(after, before]`.
    pub fn period(&self, after: i64, before: i64) -> Self {
        self.filter(|sn| sn.start > after && sn.start <= before)
    }

    /// Newest complete snapshot, the link base for the next copy.
    pub fn last_good(&self) -> Option<&Snapshot> {
        self.newest_in(SnapshotState::Complete)
    }

    /// Newest incomplete snapshot, reusable as the next copy target.
    pub fn last_incomplete(&self) -> Option<&Snapshot> {
        self.newest_in(SnapshotState::Incomplete)
    }

    fn newest_in(&self, state: SnapshotState) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|sn| sn.state == state)
    }

    fn filter(&self, keep: impl Fn(&Snapshot) -> bool) -> Self {
        Self {
            snapshots: self.snapshots.iter().filter(|sn| keep(*sn)).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SnapshotCollection {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// Result of scanning the data directory.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub snapshots: SnapshotCollection,
    /// Directories that were not usable snapshots, for the caller to log.
    pub skipped: Vec<SkippedEntry>,
}

/// The snapshot repository rooted at a destination path.
#[derive(Debug)]
pub struct Repository<F: Filesystem, C: Clock> {
    fs: F,
    clock: C,
    root: PathBuf,
}

impl<F: Filesystem, C: Clock> Repository<F, C> {
    pub fn new(fs: F, clock: C, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            clock,
            root: root.into(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Directory holding the snapshot directories.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_SUBDIR)
    }

    /// Absolute path of a snapshot's directory.
    pub fn path_of(&self, snapshot: &Snapshot) -> PathBuf {
        self.data_dir().join(snapshot.name())
    }

    /// Path of the `latest` symlink.
    pub fn latest_link(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    /// Create the root and data directory if missing.
    pub fn ensure_layout(&self) -> Result<(), RepoError> {
        let data = self.data_dir();
        self.fs
            .create_dir_all(&data)
            .map_err(|source| RepoError::Create { path: data, source })
    }

    /// List and decode the data directory.
    ///
    /// Non-directories are ignored silently; undecodable and future-dated
    /// directories are reported in [`ScanReport::skipped`]. Only a failure
    /// to list the directory itself is an error.
    pub fn scan(&self) -> Result<ScanReport, RepoError> {
        let data = self.data_dir();
        let entries = self
            .fs
            .list_dir(&data)
            .map_err(|source| RepoError::Unavailable { path: data, source })?;
        let now = self.clock.now_unix();

        let mut snapshots = Vec::new();
        let mut skipped = Vec::new();
        for entry in entries.into_iter().filter(|e| e.is_dir) {
            match Snapshot::parse(&entry.name) {
                Ok(sn) if sn.start > now => skipped.push(SkippedEntry {
                    name: entry.name,
                    reason: SkipReason::FutureStart { start: sn.start, now },
                }),
                Ok(sn) => snapshots.push(sn),
                Err(e) => skipped.push(SkippedEntry {
                    name: entry.name,
                    reason: SkipReason::Malformed(e),
                }),
            }
        }

        Ok(ScanReport {
            snapshots: SnapshotCollection::new(snapshots),
            skipped,
        })
    }

    /// Persist a new incomplete snapshot starting now.
    ///
    /// The directory exists before any copying starts, so a crash at any
    /// later point leaves a visible `incomplete` marker.
    pub fn create_incomplete(&self) -> Result<Snapshot, RepoError> {
        self.ensure_layout()?;
        let snapshot = Snapshot::incomplete(self.clock.now_unix());
        let path = self.path_of(&snapshot);
        self.fs
            .create_dir(&path)
            .map_err(|source| RepoError::Create { path, source })?;
        Ok(snapshot)
    }

    /// Move `snapshot` to `target`, renaming its directory.
    ///
    /// Entering `Complete` records the end time (with the minimum duration
    /// floor); re-entering `Incomplete` restarts the snapshot at the current
    /// time. The in-memory value only changes once the rename succeeded.
    pub fn transition(
        &self,
        snapshot: &mut Snapshot,
        target: SnapshotState,
    ) -> Result<(), RepoError> {
        if !snapshot.state.can_transition_to(target) {
            return Err(RepoError::InvalidTransition {
                name: snapshot.name(),
                from: snapshot.state,
                to: target,
            });
        }

        let next = match target {
            SnapshotState::Incomplete => Snapshot::incomplete(self.clock.now_unix()),
            SnapshotState::Complete => {
                let now = self.clock.now_unix();
                if now < snapshot.start {
                    return Err(RepoError::ClockSkew {
                        name: snapshot.name(),
                        now,
                    });
                }
                Snapshot::new(snapshot.start, snapshot.completion_time(now), target)
            }
            SnapshotState::Obsolete | SnapshotState::Purging => {
                Snapshot::new(snapshot.start, snapshot.end, target)
            }
        };

        let from = self.path_of(snapshot);
        let to = self.path_of(&next);
        if from != to {
            self.fs.rename(&from, &to).map_err(|source| RepoError::Transition {
                from: snapshot.name(),
                to: next.name(),
                source,
            })?;
        }
        *snapshot = next;
        Ok(())
    }

    /// Incomplete -> Complete, then point `latest` at the result.
    pub fn complete(&self, snapshot: &mut Snapshot) -> Result<LinkUpdate, RepoError> {
        self.transition(snapshot, SnapshotState::Complete)?;
        Ok(self.update_latest(snapshot))
    }

    /// Restart an interrupted snapshot under the current time.
    pub fn restart(&self, snapshot: &mut Snapshot) -> Result<(), RepoError> {
        self.transition(snapshot, SnapshotState::Incomplete)
    }

    /// Complete -> Obsolete.
    pub fn mark_obsolete(&self, snapshot: &mut Snapshot) -> Result<(), RepoError> {
        self.transition(snapshot, SnapshotState::Obsolete)
    }

    /// Obsolete -> Purging, then remove the tree.
    ///
    /// A snapshot already in `Purging` (an earlier removal was interrupted)
    /// is removed directly. If removal fails the directory stays visible as
    /// `purging` for the next pass.
    pub fn purge(&self, snapshot: &mut Snapshot) -> Result<(), RepoError> {
        match snapshot.state {
            SnapshotState::Obsolete => self.transition(snapshot, SnapshotState::Purging)?,
            SnapshotState::Purging => {}
            other => {
                return Err(RepoError::InvalidTransition {
                    name: snapshot.name(),
                    from: other,
                    to: SnapshotState::Purging,
                })
            }
        }

        self.fs
            .remove_dir_all(&self.path_of(snapshot))
            .map_err(|source| RepoError::Remove {
                name: snapshot.name(),
                source,
            })
    }

    /// Point `latest` at `snapshot` using a path relative to the root.
    pub fn update_latest(&self, snapshot: &Snapshot) -> LinkUpdate {
        let target = Path::new(DATA_SUBDIR).join(snapshot.name());
        match self.fs.replace_symlink(&target, &self.latest_link()) {
            Ok(()) => LinkUpdate::Updated,
            Err(e) => LinkUpdate::Failed(e),
        }
    }
}
