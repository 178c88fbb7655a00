//! Running the copy tool as a child process.
//!
//! Output is drained line by line by a spawned task while the controller
//! races the child's exit against a termination request. A termination
//! request is forwarded to the child with the same signal; if the child
//! does not exit within the grace period it is killed.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use super::command::CopyInvocation;
use crate::logger::{Level, Logger};
use crate::signal::{ShutdownFlag, Termination};

/// How long a signalled copy tool may take to exit before it is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Prefix for logged copy tool output.
pub const OUTPUT_PREFIX: &str = "(rsync) ";

/// Errors running the copy tool.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("waiting for the copy tool failed: {0}")]
    Wait(#[source] io::Error),

    #[error("cannot forward {termination} to the copy tool (pid {pid}): {source}")]
    Forward {
        termination: Termination,
        pid: u32,
        #[source]
        source: Errno,
    },
}

/// How a copy tool run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyExit {
    /// Exit code 0.
    Success,
    /// Non-zero exit code.
    Failed(i32),
    /// Killed by a signal the daemon did not send.
    Signalled(i32),
    /// A termination request arrived first and was forwarded.
    Cancelled(Termination),
}

impl CopyExit {
    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => CopyExit::Success,
            Some(code) => CopyExit::Failed(code),
            None => CopyExit::Signalled(status.signal().unwrap_or_default()),
        }
    }
}

enum Race {
    Exited(ExitStatus),
    Cancelled(Termination),
}

/// Runs copy invocations, logging output through `L`.
#[derive(Debug, Clone)]
pub struct CopyRunner<L: Logger + Clone + 'static> {
    logger: L,
    grace: Duration,
}

impl<L: Logger + Clone + 'static> CopyRunner<L> {
    pub fn new(logger: L) -> Self {
        Self {
            logger,
            grace: DEFAULT_GRACE,
        }
    }

    /// Override the grace period given to a signalled child.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run `invocation` to completion or until `shutdown` fires.
    pub async fn run(
        &self,
        invocation: &CopyInvocation,
        shutdown: &ShutdownFlag,
    ) -> Result<CopyExit, CopyError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CopyError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;
        self.logger.debug(&format!("copy tool started (pid {})", child.id().unwrap_or_default()));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let logger = self.logger.clone();
        let drain = tokio::spawn(async move {
            let _ = started_tx.send(());
            tokio::join!(drain_lines(stdout, &logger), drain_lines(stderr, &logger));
            let _ = done_tx.send(());
        });

        // The exit wait must not begin before the pipes are being read.
        let _ = started_rx.await;

        let race = tokio::select! {
            status = child.wait() => Race::Exited(status.map_err(CopyError::Wait)?),
            termination = shutdown.wait() => Race::Cancelled(termination),
        };

        let exit = match race {
            Race::Exited(status) => CopyExit::from_status(status),
            Race::Cancelled(termination) => {
                self.forward(&mut child, termination).await?;
                CopyExit::Cancelled(termination)
            }
        };

        if tokio::time::timeout(self.grace, done_rx).await.is_err() {
            self.logger
                .warn("copy tool output still open after exit; no longer reading it");
            drain.abort();
        }

        Ok(exit)
    }

    async fn forward(&self, child: &mut Child, termination: Termination) -> Result<(), CopyError> {
        if let Some(pid) = child.id() {
            self.logger
                .debug(&format!("forwarding {} to copy tool (pid {})", termination, pid));
            match kill(Pid::from_raw(pid as i32), termination.signal()) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(source) => {
                    return Err(CopyError::Forward {
                        termination,
                        pid,
                        source,
                    })
                }
            }
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(CopyError::Wait)?;
                self.logger.debug(&format!("copy tool exited after {}: {}", termination, status));
            }
            Err(_) => {
                self.logger.warn(&format!(
                    "copy tool ignored {} for {}s, killing it",
                    termination,
                    self.grace.as_secs()
                ));
                child.kill().await.map_err(CopyError::Wait)?;
            }
        }
        Ok(())
    }
}

/// Log `stream` line by line until EOF.
///
/// Lines are decoded lossily: the copy tool prints file names as raw bytes,
/// and the pipe must stay open for as long as the child writes to it.
async fn drain_lines<R, L>(stream: Option<R>, logger: &L)
where
    R: AsyncRead + Unpin,
    L: Logger,
{
    let Some(stream) = stream else {
        return;
    };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) if logger.enabled(Level::Verbose) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                logger.verbose(&format!("{}{}", OUTPUT_PREFIX, line));
            }
            Ok(_) => {}
            Err(e) => {
                logger.warn(&format!("reading copy tool output failed: {}", e));
                break;
            }
        }
    }
}
