//! Signal handling for graceful shutdown.
//!
//! [`ShutdownFlag`] records which termination signal was received and lets
//! async code wait for one. The copy runner races it against the copy
//! tool's exit so the signal can be forwarded to the child.

use std::fmt;
use std::io;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// A termination request received by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl Termination {
    /// The signal to forward to a child process.
    pub fn signal(self) -> Signal {
        match self {
            Termination::Interrupt => Signal::SIGINT,
            Termination::Terminate => Signal::SIGTERM,
        }
    }

    /// Exit status for a run ended by this signal (128 + signal number).
    pub fn exit_code(self) -> i32 {
        128 + self.signal() as i32
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signal().as_str())
    }
}

/// Flag that tracks whether shutdown has been requested, and by which signal.
///
/// Cloning shares the flag. The first signal wins.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    tx: Arc<watch::Sender<Option<Termination>>>,
}

impl ShutdownFlag {
    /// Create a flag without any signal handler attached.
    pub fn manual() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a flag fed by SIGINT and SIGTERM.
    ///
    /// Must be called from within a tokio runtime.
    pub fn install() -> io::Result<Self> {
        let flag = Self::manual();
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let handle = flag.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => Termination::Interrupt,
                    Some(()) = terminate.recv() => Termination::Terminate,
                    else => break,
                };
                handle.trigger(received);
            }
        });

        Ok(flag)
    }

    /// Record a termination request. Later requests do not replace the first.
    pub fn trigger(&self, termination: Termination) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(termination);
            true
        });
    }

    /// The pending termination request, if any.
    pub fn requested(&self) -> Option<Termination> {
        *self.tx.borrow()
    }

    /// Returns true if shutdown has been requested.
    pub fn should_stop(&self) -> bool {
        self.requested().is_some()
    }

    /// Resolve once a termination request is recorded.
    pub async fn wait(&self) -> Termination {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(termination) = *rx.borrow_and_update() {
                return termination;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender.
                std::future::pending::<()>().await;
            }
        }
    }
}
