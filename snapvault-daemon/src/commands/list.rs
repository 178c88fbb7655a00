//! List command: print the snapshots of a repository.

use std::io::Write;
use std::time::Duration;

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use snapvault_clock::Clock;
use snapvault_fs::{Filesystem, Repository};
use snapvault_schema::{Snapshot, SnapshotState};

use super::{log_skipped, CommandResult};
use crate::cli::ListArgs;
use crate::logger::Logger;

/// One listed snapshot, as printed with `--json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    pub name: String,
    pub state: SnapshotState,
    pub start: i64,
    pub end: Option<i64>,
    pub duration_secs: Option<i64>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl From<&Snapshot> for SnapshotRecord {
    fn from(snapshot: &Snapshot) -> Self {
        let end = snapshot.duration_secs().map(|_| snapshot.end);
        Self {
            name: snapshot.name(),
            state: snapshot.state,
            start: snapshot.start,
            end,
            duration_secs: snapshot.duration_secs(),
            started_at: rfc3339(snapshot.start),
            ended_at: end.map(rfc3339),
        }
    }
}

fn rfc3339(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Execute the list command, writing to `out`.
pub fn execute_list<F, C, L, W>(
    args: &ListArgs,
    fs: &F,
    clock: &C,
    logger: &L,
    out: &mut W,
) -> CommandResult<Vec<SnapshotRecord>>
where
    F: Filesystem,
    C: Clock,
    L: Logger,
    W: Write,
{
    args.validate()?;
    let repo = Repository::new(fs, clock, &args.repository);
    let scan = repo.scan()?;
    log_skipped(logger, &scan.skipped);

    let records: Vec<SnapshotRecord> = scan
        .snapshots
        .iter()
        .filter(|sn| args.state.map_or(true, |state| sn.state == state))
        .map(SnapshotRecord::from)
        .collect();

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
    } else {
        write_table(out, &records)?;
    }
    Ok(records)
}

fn write_table<W: Write>(out: &mut W, records: &[SnapshotRecord]) -> std::io::Result<()> {
    writeln!(
        out,
        "{:<20}  {:<20}  {:>12}  {:<10}  NAME",
        "STARTED", "ENDED", "DURATION", "STATE"
    )?;
    for r in records {
        let duration = r
            .duration_secs
            .map(|d| humantime::format_duration(Duration::from_secs(d.max(0) as u64)).to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<20}  {:<20}  {:>12}  {:<10}  {}",
            r.started_at,
            r.ended_at.as_deref().unwrap_or("-"),
            duration,
            r.state.token(),
            r.name
        )?;
    }
    Ok(())
}
