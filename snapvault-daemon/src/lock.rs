//! Single-instance pid lock.
//!
//! Only one daemon may drive a repository at a time. The lock is a pid
//! file created exclusively; its existence means another instance owns
//! the repository.

use std::io;
use std::path::{Path, PathBuf};

use snapvault_fs::{Filesystem, FsError};
use thiserror::Error;

/// Errors acquiring the pid lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("already running: pid file {} exists{}", path.display(), owner(*pid))]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    #[error("cannot create pid file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: FsError,
    },
}

fn owner(pid: Option<u32>) -> String {
    pid.map(|p| format!(" (pid {})", p)).unwrap_or_default()
}

/// A held pid lock. Release it with [`PidLock::release`].
#[derive(Debug)]
pub struct PidLock<'a, F: Filesystem> {
    fs: &'a F,
    path: PathBuf,
}

impl<'a, F: Filesystem> PidLock<'a, F> {
    /// Create `path` exclusively and write `pid` into it.
    pub fn acquire(fs: &'a F, path: impl Into<PathBuf>, pid: u32) -> Result<Self, LockError> {
        let path = path.into();
        match fs.create_new(&path, format!("{}\n", pid).as_bytes()) {
            Ok(()) => Ok(Self { fs, path }),
            Err(e) if e.kind() == Some(io::ErrorKind::AlreadyExists) => {
                let pid = fs
                    .read_file(&path)
                    .ok()
                    .and_then(|content| content.trim().parse().ok());
                Err(LockError::AlreadyRunning { path, pid })
            }
            Err(source) => Err(LockError::Create { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the pid file.
    pub fn release(self) -> Result<(), FsError> {
        self.fs.remove_file(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapvault_fs::{MockFilesystem, RealFilesystem};
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid() {
        let fs = MockFilesystem::new();
        fs.add_dir("/run");

        let lock = PidLock::acquire(&fs, "/run/snapvault.pid", 4242).expect("acquire");

        assert_eq!(lock.path(), Path::new("/run/snapvault.pid"));
        assert_eq!(fs.read_file(Path::new("/run/snapvault.pid")).unwrap(), "4242\n");
    }

    #[test]
    fn test_second_acquire_reports_owner() {
        let fs = MockFilesystem::new();
        fs.add_dir("/run");
        let _held = PidLock::acquire(&fs, "/run/snapvault.pid", 4242).expect("acquire");

        let err = PidLock::acquire(&fs, "/run/snapvault.pid", 5000).unwrap_err();

        assert!(matches!(err, LockError::AlreadyRunning { pid: Some(4242), .. }));
        assert!(err.to_string().contains("(pid 4242)"));
    }

    #[test]
    fn test_release_allows_reacquire() {
        let fs = MockFilesystem::new();
        fs.add_dir("/run");
        let lock = PidLock::acquire(&fs, "/run/snapvault.pid", 1).expect("acquire");
        lock.release().expect("release");

        assert!(!fs.exists(Path::new("/run/snapvault.pid")));
        assert!(PidLock::acquire(&fs, "/run/snapvault.pid", 2).is_ok());
    }

    #[test]
    fn test_missing_directory_is_create_error() {
        let fs = MockFilesystem::new();
        let err = PidLock::acquire(&fs, "/nonexistent/snapvault.pid", 1).unwrap_err();
        assert!(matches!(err, LockError::Create { .. }));
    }

    #[test]
    fn test_real_lock_is_exclusive() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("snapvault.pid");

        let lock = PidLock::acquire(&RealFilesystem, &path, 77).expect("acquire");
        assert!(matches!(
            PidLock::acquire(&RealFilesystem, &path, 78),
            Err(LockError::AlreadyRunning { pid: Some(77), .. })
        ));

        lock.release().expect("release");
        assert!(!path.exists());
    }
}
