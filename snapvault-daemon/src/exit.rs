//! Exit codes for the snapvault CLI.
//!
//! Following Unix conventions for exit codes.

use snapvault_fs::RepoError;

use crate::commands::CommandError;
use crate::copy::OrchestratorError;
use crate::lock::LockError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// IO error.
    pub const IO_ERROR: i32 = 2;
    /// Repository cannot be listed.
    pub const REPOSITORY_UNAVAILABLE: i32 = 3;
    /// Copy tool failed or could not be started.
    pub const COPY_FAILED: i32 = 4;
    /// A snapshot rename or removal failed.
    pub const TRANSITION_FAILED: i32 = 5;
    /// Another instance holds the pid lock.
    pub const ALREADY_RUNNING: i32 = 6;
    /// Interrupted by SIGINT (128 + signal number).
    pub const SIGINT: i32 = 130;
    /// Terminated by SIGTERM (128 + signal number).
    pub const SIGTERM: i32 = 143;
}

/// Map a CommandError to an exit code.
pub fn exit_code(error: &CommandError) -> i32 {
    match error {
        CommandError::InvalidArgument(_) => codes::INVALID_ARGS,
        CommandError::Repository(e) => repository_code(e),
        CommandError::Lock(LockError::AlreadyRunning { .. }) => codes::ALREADY_RUNNING,
        CommandError::Lock(LockError::Create { .. }) => codes::IO_ERROR,
        CommandError::Snapshot(e) => snapshot_code(e),
        CommandError::Io(_) | CommandError::Json(_) => codes::IO_ERROR,
    }
}

fn repository_code(error: &RepoError) -> i32 {
    match error {
        RepoError::Unavailable { .. } => codes::REPOSITORY_UNAVAILABLE,
        RepoError::Create { .. } => codes::IO_ERROR,
        RepoError::InvalidTransition { .. }
        | RepoError::ClockSkew { .. }
        | RepoError::Transition { .. }
        | RepoError::Remove { .. } => codes::TRANSITION_FAILED,
    }
}

fn snapshot_code(error: &OrchestratorError) -> i32 {
    match error {
        OrchestratorError::Repository(e) => repository_code(e),
        OrchestratorError::Copy(_)
        | OrchestratorError::CopyFailed { .. }
        | OrchestratorError::CopyKilled { .. } => codes::COPY_FAILED,
        OrchestratorError::Cancelled { termination, .. } => termination.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliError;
    use crate::copy::CopyError;
    use crate::signal::Termination;
    use snapvault_fs::FsError;
    use std::path::PathBuf;

    fn fs_err() -> FsError {
        FsError::Path("test".to_string())
    }

    #[test]
    fn test_exit_code_invalid_argument() {
        let error = CommandError::InvalidArgument(CliError::UnknownSchedule("x".into()));
        assert_eq!(exit_code(&error), codes::INVALID_ARGS);
    }

    #[test]
    fn test_exit_code_repository_unavailable() {
        let error = CommandError::Repository(RepoError::Unavailable {
            path: PathBuf::from("/backup/.data"),
            source: fs_err(),
        });
        assert_eq!(exit_code(&error), codes::REPOSITORY_UNAVAILABLE);
    }

    #[test]
    fn test_exit_code_transition() {
        let error = CommandError::Repository(RepoError::Transition {
            from: "1-2-complete".into(),
            to: "1-2-obsolete".into(),
            source: fs_err(),
        });
        assert_eq!(exit_code(&error), codes::TRANSITION_FAILED);
    }

    #[test]
    fn test_exit_code_already_running() {
        let error = CommandError::Lock(LockError::AlreadyRunning {
            path: PathBuf::from("/run/snapvault.pid"),
            pid: None,
        });
        assert_eq!(exit_code(&error), codes::ALREADY_RUNNING);
    }

    #[test]
    fn test_exit_code_copy_failed() {
        let error = CommandError::Snapshot(OrchestratorError::CopyFailed {
            name: "1-0-incomplete".into(),
            code: 1,
        });
        assert_eq!(exit_code(&error), codes::COPY_FAILED);

        let spawn = CommandError::Snapshot(OrchestratorError::Copy(CopyError::Spawn {
            program: "rsync".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }));
        assert_eq!(exit_code(&spawn), codes::COPY_FAILED);
    }

    #[test]
    fn test_exit_code_cancelled_matches_signal() {
        let interrupted = CommandError::Snapshot(OrchestratorError::Cancelled {
            name: "1-0-incomplete".into(),
            termination: Termination::Interrupt,
        });
        let terminated = CommandError::Snapshot(OrchestratorError::Cancelled {
            name: "1-0-incomplete".into(),
            termination: Termination::Terminate,
        });
        assert_eq!(exit_code(&interrupted), codes::SIGINT);
        assert_eq!(exit_code(&terminated), codes::SIGTERM);
    }

    #[test]
    fn test_exit_code_orchestrator_repository_error() {
        let error = CommandError::Snapshot(OrchestratorError::Repository(RepoError::Create {
            path: PathBuf::from("/backup/.data"),
            source: fs_err(),
        }));
        assert_eq!(exit_code(&error), codes::IO_ERROR);
    }

    #[test]
    fn test_exit_codes_fit_in_u8() {
        for code in [
            codes::SUCCESS,
            codes::INVALID_ARGS,
            codes::IO_ERROR,
            codes::REPOSITORY_UNAVAILABLE,
            codes::COPY_FAILED,
            codes::TRANSITION_FAILED,
            codes::ALREADY_RUNNING,
            codes::SIGINT,
            codes::SIGTERM,
        ] {
            assert!(u8::try_from(code).is_ok());
        }
    }
}
