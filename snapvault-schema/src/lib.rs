//! snapvault snapshot schema.
//!
//! A snapshot is persisted only as its directory name,
//! `<startUnix>-<endUnix>-<state>`.

mod snapshot;

pub use snapshot::{
    decode, encode, NameError, Snapshot, SnapshotState, INCOMPLETE_END, MIN_DURATION_SECS,
};
