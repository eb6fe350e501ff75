//! Capture deadline and shutdown supervision
//!
//! A capture runs against one wall-clock deadline. Reaching a terminal state
//! first drops the timer; the deadline firing first drops the session future,
//! closes the socket and resolves the capture with `Timeout`.

use super::connection::GhostSession;
use super::machine::SessionEvent;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Default capture deadline
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver half of the host shutdown signal (`true` = shut down)
pub type ShutdownSignal = watch::Receiver<bool>;

/// Bounds one capture by a deadline and an optional shutdown signal
#[derive(Debug, Clone)]
pub struct CaptureSupervisor {
    deadline: Duration,
    shutdown: Option<ShutdownSignal>,
}

impl CaptureSupervisor {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Drive `session` to a single outcome
    pub async fn supervise(&self, session: &mut GhostSession) -> Result<PathBuf> {
        let mut shutdown = self.shutdown.clone();

        let interruption = {
            let run = session.run();
            tokio::pin!(run);

            tokio::select! {
                _ = &mut run => None,
                _ = tokio::time::sleep(self.deadline) => Some(SessionEvent::TimedOut(self.deadline)),
                _ = shutdown_requested(shutdown.as_mut()) => Some(SessionEvent::Shutdown),
            }
        };

        match interruption {
            Some(event) => {
                tracing::warn!(
                    state = session.state().as_str(),
                    deadline_ms = self.deadline.as_millis() as u64,
                    event = ?event,
                    "Capture interrupted"
                );
                session.interrupt(event).await;
            }
            None => session.close().await,
        }

        session.take_outcome().unwrap_or_else(|| {
            Err(Error::Protocol(format!(
                "session stopped in non-terminal state {}",
                session.state().as_str()
            )))
        })
    }
}

impl Default for CaptureSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_TIMEOUT)
    }
}

/// Resolves once the signal reads `true`; never resolves without a signal
/// or after the sender is gone
pub(crate) async fn shutdown_requested(signal: Option<&mut ShutdownSignal>) {
    let Some(rx) = signal else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
