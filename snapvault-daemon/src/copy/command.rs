//! Copy tool invocation and exit-code classification.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default copy tool executable.
pub const DEFAULT_RSYNC_PATH: &str = "rsync";

/// Copy tool exit codes that indicate a recoverable condition.
///
/// A run ending with one of these leaves its snapshot incomplete for the
/// next cycle to pick up again.
pub const TRANSIENT_EXIT_CODES: &[(i32, &str)] = &[
    (6, "daemon unable to append to log-file"),
    (10, "error in socket I/O"),
    (11, "error in file I/O"),
    (12, "error in rsync protocol data stream"),
    (13, "errors with program diagnostics"),
    (14, "error in IPC code"),
    (20, "received SIGUSR1 or SIGINT"),
    (21, "some error returned by waitpid()"),
    (22, "error allocating core memory buffers"),
    (23, "partial transfer due to error"),
    (24, "partial transfer due to vanished source files"),
    (25, "the --max-delete limit stopped deletions"),
    (30, "timeout in data send/receive"),
    (35, "timeout waiting for daemon connection"),
];

/// Reason text if `code` is a transient copy tool exit code.
pub fn transient_reason(code: i32) -> Option<&'static str> {
    TRANSIENT_EXIT_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, reason)| *reason)
}

/// The configured copy tool: executable plus operator-supplied options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTool {
    pub program: PathBuf,
    pub options: Vec<String>,
}

impl Default for CopyTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_RSYNC_PATH),
            options: Vec::new(),
        }
    }
}

impl CopyTool {
    pub fn new(program: impl Into<PathBuf>, options: Vec<String>) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    /// Build the command line copying `origin` into `target`.
    ///
    /// Arguments are `--delete -a <options...> [--link-dest=<base>] <origin> <target>`.
    pub fn invocation(
        &self,
        origin: &Path,
        target: &Path,
        link_base: Option<&Path>,
        working_dir: &Path,
    ) -> CopyInvocation {
        let mut args: Vec<OsString> = vec!["--delete".into(), "-a".into()];
        args.extend(self.options.iter().map(OsString::from));
        if let Some(base) = link_base {
            let mut link_dest = OsString::from("--link-dest=");
            link_dest.push(base);
            args.push(link_dest);
        }
        args.push(origin.into());
        args.push(target.into());

        CopyInvocation {
            program: self.program.clone(),
            args,
            working_dir: working_dir.to_path_buf(),
        }
    }
}

/// A fully built copy tool command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl CopyInvocation {
    /// The command line as one string, for logging.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }}
