//! Snapshot entity and its directory-name encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// End-time placeholder encoded for snapshots that have not completed.
pub const INCOMPLETE_END: i64 = 0;

/// Shortest duration a completed snapshot may span, in seconds.
pub const MIN_DURATION_SECS: i64 = 1;

/// Lifecycle state of a snapshot. Exactly one state applies at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotState {
    /// Copy in progress, or interrupted.
    Incomplete,
    /// Copy finished; usable as a link base.
    Complete,
    /// Superseded by retention, pending deletion.
    Obsolete,
    /// Deletion started.
    Purging,
}

impl SnapshotState {
    /// All states, in lifecycle order.
    pub const ALL: [SnapshotState; 4] = [
        SnapshotState::Incomplete,
        SnapshotState::Complete,
        SnapshotState::Obsolete,
        SnapshotState::Purging,
    ];

    /// Token used in directory names.
    pub fn token(self) -> &'static str {
        match self {
            SnapshotState::Incomplete => "incomplete",
            SnapshotState::Complete => "complete",
            SnapshotState::Obsolete => "obsolete",
            SnapshotState::Purging => "purging",
        }
    }

    /// Parse a directory-name token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.token() == token)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// `Incomplete -> Incomplete` is the restart of an interrupted copy
    /// under a new start time.
    pub fn can_transition_to(self, next: SnapshotState) -> bool {
        matches!(
            (self, next),
            (SnapshotState::Incomplete, SnapshotState::Incomplete)
                | (SnapshotState::Incomplete, SnapshotState::Complete)
                | (SnapshotState::Complete, SnapshotState::Obsolete)
                | (SnapshotState::Obsolete, SnapshotState::Purging)
        )
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SnapshotState::Incomplete => "Incomplete",
            SnapshotState::Complete => "Complete",
            SnapshotState::Obsolete => "Obsolete",
            SnapshotState::Purging => "Purging",
        };
        f.write_str(label)
    }
}

impl FromStr for SnapshotState {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(&s.to_ascii_lowercase())
            .ok_or_else(|| NameError::UnknownState(s.to_string()))
    }
}

/// Errors decoding a directory name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("malformed snapshot name: {0}")]
    MalformedName(String),

    #[error("unknown snapshot state in name: {0}")]
    UnknownState(String),
}

/// One point-in-time copy of the origin tree.
///
/// The directory name (see [`Snapshot::name`]) is the only persisted form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    pub start: i64,
    pub end: i64,
    pub state: SnapshotState,
}

impl Snapshot {
    /// Create a snapshot from its three components.
    pub fn new(start: i64, end: i64, state: SnapshotState) -> Self {
        Self { start, end, state }
    }

    /// A freshly started snapshot.
    pub fn incomplete(start: i64) -> Self {
        Self::new(start, INCOMPLETE_END, SnapshotState::Incomplete)
    }

    /// Directory name encoding `(start, end, state)`.
    pub fn name(&self) -> String {
        encode(self.start, self.end, self.state)
    }

    /// Decode a directory name.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let (start, end, state) = decode(name)?;
        Ok(Self::new(start, end, state))
    }

    /// End time to record when completing at `now`, with the minimum
    /// duration floor applied.
    pub fn completion_time(&self, now: i64) -> i64 {
        now.max(self.start + MIN_DURATION_SECS)
    }

    /// Seconds between start and end; `None` while incomplete.
    pub fn duration_secs(&self) -> Option<i64> {
        match self.state {
            SnapshotState::Incomplete => None,
            _ => Some(self.end - self.start),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} {}", self.start, self.end, self.state)
    }
}

/// Encode a snapshot as `<start>-<end>-<state>`.
pub fn encode(start: i64, end: i64, state: SnapshotState) -> String {
    format!("{}-{}-{}", start, end, state.token())
}

/// Decode `<start>-<end>-<state>`.
///
/// Times must be plain decimal digits so that every accepted name
/// re-encodes to itself.
pub fn decode(name: &str) -> Result<(i64, i64, SnapshotState), NameError> {
    let malformed = || NameError::MalformedName(name.to_string());

    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let start = parse_time(parts[0]).ok_or_else(malformed)?;
    let end = parse_time(parts[1]).ok_or_else(malformed)?;
    let state = SnapshotState::from_token(parts[2])
        .ok_or_else(|| NameError::UnknownState(name.to_string()))?;

    Ok((start, end, state))
}

fn parse_time(token: &str) -> Option<i64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Leading zeros would not survive re-encoding.
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}
