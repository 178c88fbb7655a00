//! End-to-end snapshot lifecycle scenarios against a real directory tree
//! and a scripted stand-in for rsync.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use snapvault_clock::MockClock;
use snapvault_daemon::{
    CopyRunner, CopyTool, MockLogger, Orchestrator, OrchestratorError, ShutdownFlag,
    SnapshotOutcome, Termination,
};
use snapvault_fs::{
    prune, MockFilesystem, RealFilesystem, Repository, RetentionTiers, LATEST_LINK,
};
use snapvault_schema::{Snapshot, SnapshotState};
use tempfile::{tempdir, TempDir};

const T0: i64 = 1_700_000_000;

struct Env {
    dir: TempDir,
    clock: MockClock,
}

impl Env {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let origin = dir.path().join("origin");
        std::fs::create_dir(&origin).expect("origin");
        std::fs::write(origin.join("file.txt"), b"payload").expect("origin file");
        Self {
            dir,
            clock: MockClock::new(T0),
        }
    }

    fn origin(&self) -> PathBuf {
        self.dir.path().join("origin")
    }

    fn repo_root(&self) -> PathBuf {
        self.dir.path().join("repository")
    }

    fn repo(&self) -> Repository<RealFilesystem, &MockClock> {
        Repository::new(RealFilesystem, &self.clock, self.repo_root())
    }

    /// A copy tool that records its arguments one per line, prints a line
    /// of output and then runs `tail`.
    fn tool(&self, tail: &str) -> CopyTool {
        let script = self.dir.path().join("fake-rsync");
        let body = format!(
            "#!/bin/sh\n\
             for a in \"$@\"; do echo \"$a\" >> {}; done\n\
             echo sending incremental file list\n\
             {}\n",
            self.args_file().display(),
            tail
        );
        std::fs::write(&script, body).expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        CopyTool::new(script, Vec::new())
    }

    fn args_file(&self) -> PathBuf {
        self.dir.path().join("rsync-args")
    }

    fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.args_file())
            .expect("copy tool ran")
            .lines()
            .map(String::from)
            .collect()
    }

    fn data_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.repo_root().join(".data"))
            .expect("data dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

// ===========================================
// Scenario A: first snapshot
// ===========================================

#[tokio::test]
async fn test_first_snapshot_creates_repository_and_completes() {
    let env = Env::new();
    let repo = env.repo();
    let tool = env.tool("exit 0");
    let logger = MockLogger::new();
    let orch = Orchestrator::new(&repo, &tool, env.origin(), logger.clone());
    assert!(!env.repo_root().exists());

    let outcome = orch
        .create_snapshot(None, &ShutdownFlag::manual())
        .await
        .expect("create");

    let SnapshotOutcome::Completed(snapshot) = outcome else {
        panic!("expected a completed snapshot, got {:?}", outcome);
    };
    assert_eq!(snapshot.start, T0);
    assert!(snapshot.end >= T0 + 1);
    assert_eq!(snapshot.state, SnapshotState::Complete);
    assert_eq!(env.data_entries(), vec![snapshot.name()]);

    let link = std::fs::read_link(env.repo_root().join(LATEST_LINK)).expect("latest link");
    assert_eq!(link, Path::new(".data").join(snapshot.name()));

    // The copy target was the incomplete directory, not the final name.
    let args = env.recorded_args();
    let target = repo.data_dir().join(format!("{T0}-0-incomplete"));
    assert_eq!(args.last().map(String::as_str), target.to_str());
    assert!(!args.iter().any(|a| a.starts_with("--link-dest=")));
    assert!(logger.contains("(rsync) sending incremental file list"));
}

// ===========================================
// Scenario B: link base
// ===========================================

#[tokio::test]
async fn test_second_snapshot_links_against_last_complete() {
    let env = Env::new();
    let repo = env.repo();
    let tool = env.tool("exit 0");
    let orch = Orchestrator::new(&repo, &tool, env.origin(), MockLogger::new());

    orch.create_snapshot(None, &ShutdownFlag::manual())
        .await
        .expect("first");
    std::fs::remove_file(env.args_file()).expect("reset args");
    env.clock.advance(3600);

    let base = repo
        .scan()
        .expect("scan")
        .snapshots
        .last_good()
        .cloned()
        .expect("complete snapshot");
    let outcome = orch
        .create_snapshot(Some(&base), &ShutdownFlag::manual())
        .await
        .expect("second");

    assert!(matches!(outcome, SnapshotOutcome::Completed(_)));
    let expected = format!("--link-dest={}", repo.path_of(&base).display());
    let args = env.recorded_args();
    assert!(args.contains(&expected), "{:?} should contain {}", args, expected);
    assert_eq!(env.data_entries().len(), 2);
}

// ===========================================
// Scenario C: transient copy failure
// ===========================================

#[tokio::test]
async fn test_vanished_files_exit_is_not_fatal() {
    let env = Env::new();
    let repo = env.repo();
    let tool = env.tool("exit 24");
    let orch = Orchestrator::new(&repo, &tool, env.origin(), MockLogger::new());

    let outcome = orch
        .create_snapshot(None, &ShutdownFlag::manual())
        .await
        .expect("transient exit is not an error");

    match outcome {
        SnapshotOutcome::Deferred {
            snapshot,
            code,
            reason,
        } => {
            assert_eq!(code, 24);
            assert_eq!(reason, "partial transfer due to vanished source files");
            assert_eq!(snapshot, Snapshot::incomplete(T0));
        }
        other => panic!("expected deferral, got {:?}", other),
    }
    assert_eq!(env.data_entries(), vec![format!("{T0}-0-incomplete")]);
    assert!(!env.repo_root().join(LATEST_LINK).exists());
}

#[tokio::test]
async fn test_deferred_snapshot_is_reused_by_next_attempt() {
    let env = Env::new();
    let repo = env.repo();
    let failing = env.tool("exit 24");
    Orchestrator::new(&repo, &failing, env.origin(), MockLogger::new())
        .create_snapshot(None, &ShutdownFlag::manual())
        .await
        .expect("deferred");

    env.clock.advance(600);
    let working = env.tool("exit 0");
    let outcome = Orchestrator::new(&repo, &working, env.origin(), MockLogger::new())
        .create_snapshot(None, &ShutdownFlag::manual())
        .await
        .expect("completed");

    let SnapshotOutcome::Completed(snapshot) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(snapshot.start, T0 + 600);
    assert_eq!(env.data_entries(), vec![snapshot.name()]);
}

#[tokio::test]
async fn test_unknown_exit_code_is_fatal() {
    let env = Env::new();
    let repo = env.repo();
    let tool = env.tool("exit 3");
    let orch = Orchestrator::new(&repo, &tool, env.origin(), MockLogger::new());

    let err = orch
        .create_snapshot(None, &ShutdownFlag::manual())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::CopyFailed { code: 3, .. }));
    assert_eq!(env.data_entries(), vec![format!("{T0}-0-incomplete")]);
}

// ===========================================
// Cancellation
// ===========================================

#[tokio::test]
async fn test_termination_during_copy_is_forwarded_and_reported() {
    let env = Env::new();
    let repo = env.repo();
    let tool = env.tool("exec sleep 30");
    let orch = Orchestrator::new(&repo, &tool, env.origin(), MockLogger::new())
        .with_runner(CopyRunner::new(MockLogger::new()).with_grace(Duration::from_secs(5)));
    let shutdown = ShutdownFlag::manual();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.trigger(Termination::Terminate);
    });

    let err = tokio::time::timeout(Duration::from_secs(20), orch.create_snapshot(None, &shutdown))
        .await
        .expect("copy stopped promptly")
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Cancelled {
            termination: Termination::Terminate,
            ..
        }
    ));
    assert_eq!(env.data_entries(), vec![format!("{T0}-0-incomplete")]);
}

// ===========================================
// Scenario D: retention and purge
// ===========================================

fn complete(start: i64) -> Snapshot {
    Snapshot::new(start, start + 60, SnapshotState::Complete)
}

fn hourly() -> RetentionTiers {
    RetentionTiers::from_lengths(&[Duration::from_secs(3600), Duration::from_secs(86_400)])
        .expect("tiers")
}

#[test]
fn test_three_in_one_tier_keeps_newest_and_purges_rest() {
    let env = Env::new();
    let repo = env.repo();
    repo.ensure_layout().expect("layout");
    let starts = [T0 - 900, T0 - 600, T0 - 300];
    for start in starts {
        let path = repo.path_of(&complete(start));
        std::fs::create_dir(&path).expect("snapshot dir");
        std::fs::write(path.join("file.txt"), b"payload").expect("content");
    }

    let result = prune(&repo, &hourly(), true).expect("prune");

    assert_eq!(result.retained, vec![complete(T0 - 300)]);
    assert_eq!(
        result.marked_obsolete,
        vec![
            Snapshot::new(T0 - 900, T0 - 840, SnapshotState::Obsolete),
            Snapshot::new(T0 - 600, T0 - 540, SnapshotState::Obsolete),
        ]
    );
    assert_eq!(result.purge.purged.len(), 2);
    assert!(result.purge.purged.iter().all(|s| s.state == SnapshotState::Purging));
    assert_eq!(env.data_entries(), vec![complete(T0 - 300).name()]);
}

#[test]
fn test_failed_removal_stays_visible_as_purging() {
    let fs = MockFilesystem::new();
    fs.add_dir("/backup/.data");
    for start in [T0 - 900, T0 - 600, T0 - 300] {
        fs.add_dir(format!("/backup/.data/{}", complete(start).name()));
    }
    let stuck = Snapshot::new(T0 - 900, T0 - 840, SnapshotState::Purging);
    fs.fail_removal_of(format!("/backup/.data/{}", stuck.name()));
    let clock = MockClock::new(T0);
    let repo = Repository::new(fs.clone(), &clock, "/backup");

    let result = prune(&repo, &hourly(), true).expect("prune");

    assert_eq!(result.purge.purged.len(), 1);
    assert_eq!(result.purge.failed.len(), 1);
    let rescan = repo.scan().expect("rescan");
    assert_eq!(
        rescan.snapshots.as_slice(),
        &[stuck.clone(), complete(T0 - 300)]
    );

    // The next pass retries the interrupted removal.
    fs.clear_failures();
    let retry = prune(&repo, &hourly(), true).expect("second prune");
    assert_eq!(retry.purge.purged, vec![stuck]);
    assert_eq!(fs.dir_names("/backup/.data"), vec![complete(T0 - 300).name()]);
}

#[test]
fn test_incomplete_snapshot_survives_retention() {
    let env = Env::new();
    let repo = env.repo();
    repo.ensure_layout().expect("layout");
    let active = Snapshot::incomplete(T0 - 10 * 86_400);
    std::fs::create_dir(repo.path_of(&active)).expect("incomplete dir");

    let result = prune(&repo, &hourly(), true).expect("prune");

    assert!(result.marked_obsolete.is_empty());
    assert_eq!(env.data_entries(), vec![active.name()]);
}
