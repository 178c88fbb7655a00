//! Tiered retention.
//!
//! A [`RetentionTiers`] value splits the past into consecutive windows
//! measured back from "now". Each window keeps only its newest complete
//! snapshot; everything else complete, and everything older than the last
//! window, becomes obsolete. A retention pass ([`prune`]) applies the plan
//! and hands obsolete snapshots to the purge worker.

use std::collections::HashSet;
use std::time::Duration;

use snapvault_clock::Clock;
use snapvault_schema::{Snapshot, SnapshotState};
use thiserror::Error;

use crate::fs::Filesystem;
use crate::purge::{purge_pending, PurgeReport};
use crate::repository::{RepoError, Repository, SkippedEntry, SnapshotCollection};

/// Errors building a tier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("at least one retention tier is required")]
    Empty,

    #[error("retention tier {0} has zero length")]
    ZeroLength(usize),

    #[error("first retention offset must be 0, got {0}")]
    NonZeroStart(u64),

    #[error("retention offset {0} does not increase")]
    NotIncreasing(usize),
}

/// Consecutive retention windows, as offsets in seconds before "now".
///
/// `offset(0)` is always 0. Tier `i` covers `(now - offset(i+1), now - offset(i)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionTiers {
    offsets: Vec<u64>,
}

impl RetentionTiers {
    /// Build tiers from explicit offsets, `[0, o1, o2, ...]`.
    pub fn from_offsets(offsets: Vec<u64>) -> Result<Self, TierError> {
        match offsets.first() {
            None => return Err(TierError::Empty),
            Some(&first) if first != 0 => return Err(TierError::NonZeroStart(first)),
            Some(_) => {}
        }
        if offsets.len() < 2 {
            return Err(TierError::Empty);
        }
        if let Some(i) = offsets.windows(2).position(|w| w[1] <= w[0]) {
            return Err(TierError::NotIncreasing(i + 1));
        }
        Ok(Self { offsets })
    }

    /// Build tiers from the length of each window, newest first.
    pub fn from_lengths(lengths: &[Duration]) -> Result<Self, TierError> {
        if lengths.is_empty() {
            return Err(TierError::Empty);
        }
        let mut offsets = Vec::with_capacity(lengths.len() + 1);
        offsets.push(0u64);
        let mut total = 0u64;
        for (i, length) in lengths.iter().enumerate() {
            let secs = length.as_secs();
            if secs == 0 {
                return Err(TierError::ZeroLength(i));
            }
            total = total.saturating_add(secs);
            offsets.push(total);
        }
        Self::from_offsets(offsets)
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset `i` in seconds; `offset(0) == 0`.
    pub fn offset(&self, i: usize) -> u64 {
        self.offsets[i]
    }

    /// Length of tier `i` in seconds.
    pub fn length(&self, i: usize) -> u64 {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Bounds `(after, before]` of tier `i` relative to `now`.
    pub fn window(&self, i: usize, now: i64) -> (i64, i64) {
        (
            now.saturating_sub(to_i64(self.offsets[i + 1])),
            now.saturating_sub(to_i64(self.offsets[i])),
        )
    }

    /// Age beyond which no snapshot is kept.
    pub fn horizon(&self) -> u64 {
        self.offsets[self.offsets.len() - 1]
    }}

fn to_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Partition of the complete snapshots into kept and superseded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub retain: Vec<Snapshot>,
    pub obsolete: Vec<Snapshot>,
}

/// Decide which complete snapshots to keep.
///
/// Only `Complete` snapshots take part: incomplete ones may be an active
/// copy, and obsolete or purging ones are already on their way out. Every
/// complete snapshot lands in exactly one of `retain` and `obsolete`.
/// Snapshots dated after `now` are retained.
pub fn plan_retention(
    snapshots: &SnapshotCollection,
    tiers: &RetentionTiers,
    now: i64,
) -> RetentionPlan {
    let complete = snapshots.with_state(SnapshotState::Complete);

    let mut retain = Vec::new();
    for i in 0..tiers.len() {
        let (after, before) = tiers.window(i, now);
        // The collection is ordered by (start, name): the last entry is the
        // single deterministic winner of the tier.
        if let Some(newest) = complete.period(after, before).iter().last() {
            retain.push(newest.clone());
        }
    }
    retain.extend(complete.iter().filter(|sn| sn.start > now).cloned());

    let kept: HashSet<&Snapshot> = retain.iter().collect();
    let obsolete = complete
        .iter()
        .filter(|sn| !kept.contains(sn))
        .cloned()
        .collect();

    retain.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name().cmp(&b.name())));
    RetentionPlan { retain, obsolete }
}

/// Result of a retention pass.
#[derive(Debug, Default)]
pub struct PruneResult {
    /// Complete snapshots kept by the plan.
    pub retained: Vec<Snapshot>,
    /// Snapshots moved from complete to obsolete in this pass.
    pub marked_obsolete: Vec<Snapshot>,
    /// Outcome of the purge step; empty when purging is disabled.
    pub purge: PurgeReport,
    /// Directories the scan could not use.
    pub skipped: Vec<SkippedEntry>,
}

/// Run one retention pass: scan, plan, mark obsolete, then purge.
///
/// A failed rename aborts the pass. A failed removal is recorded in the
/// purge report and the pass moves on to the next snapshot.
pub fn prune<F: Filesystem, C: Clock>(
    repo: &Repository<F, C>,
    tiers: &RetentionTiers,
    purge: bool,
) -> Result<PruneResult, RepoError> {
    let scan = repo.scan()?;
    let now = repo.clock().now_unix();
    let plan = plan_retention(&scan.snapshots, tiers, now);

    let mut marked_obsolete = Vec::with_capacity(plan.obsolete.len());
    for mut snapshot in plan.obsolete {
        repo.mark_obsolete(&mut snapshot)?;
        marked_obsolete.push(snapshot);
    }

    let purge = if purge {
        purge_pending(repo)?
    } else {
        PurgeReport::default()
    };

    Ok(PruneResult {
        retained: plan.retain,
        marked_obsolete,
        purge,
        skipped: scan.skipped,
    })
}
