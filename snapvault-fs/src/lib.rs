//! Snapshot repository for snapvault.
//!
//! This crate provides:
//! - Filesystem trait with real and in-memory implementations
//! - Repository scanning and atomic state transitions
//! - Tiered retention planning and the retention pass
//! - The purge worker for obsolete snapshots

pub mod fs;
pub mod purge;
pub mod repository;
pub mod retention;

pub use fs::{DirEntry, Filesystem, FsError, MockFilesystem, RealFilesystem};
pub use purge::{purge_pending, PurgeFailure, PurgeReport};
pub use repository::{
    LinkUpdate, RepoError, Repository, ScanReport, SkipReason, SkippedEntry, SnapshotCollection,
    DATA_SUBDIR, LATEST_LINK,
};
pub use retention::{plan_retention, prune, PruneResult, RetentionPlan, RetentionTiers, TierError};
