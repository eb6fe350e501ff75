//! SessionManager - one live control session per camera
//!
//! ## Purpose
//!
//! - A camera accepts a single control session at a time, so captures of the
//!   same camera are serialized
//! - A second caller waits briefly for the running capture to finish
//! - Host shutdown is broadcast to every running capture

use crate::error::{Error, Result};
use crate::ghost_session::ShutdownSignal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::timeout;

/// Default wait for a busy camera (5 seconds)
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// SessionManager - serializes control sessions per camera id
pub struct SessionManager {
    /// Per-camera locks
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    wait_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_WAIT_TIMEOUT_MS)
    }

    /// Create with a custom busy-wait timeout
    pub fn with_timeout(timeout_ms: u64) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            locks: RwLock::new(HashMap::new()),
            wait_timeout: Duration::from_millis(timeout_ms),
            shutdown_tx,
        }
    }

    /// Reserve the camera for one session (waits while it is busy)
    ///
    /// The lease releases the camera when dropped.
    pub async fn acquire(&self, camera_id: &str) -> Result<SessionLease> {
        if self.is_shutting_down() {
            return Err(Error::Cancelled("session manager shut down".to_string()));
        }

        let lock = self.get_or_create_lock(camera_id).await;

        match timeout(self.wait_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(camera_id = %camera_id, "Camera session acquired");
                Ok(SessionLease {
                    camera_id: camera_id.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    timeout_ms = self.wait_timeout.as_millis() as u64,
                    "Camera session wait timed out - camera busy"
                );
                Err(Error::Busy(camera_id.to_string()))
            }
        }
    }

    /// Reserve the camera without waiting
    pub async fn try_acquire(&self, camera_id: &str) -> Option<SessionLease> {
        let lock = self.get_or_create_lock(camera_id).await;

        match lock.try_lock_owned() {
            Ok(guard) => Some(SessionLease {
                camera_id: camera_id.to_string(),
                _guard: guard,
            }),
            Err(_) => {
                tracing::debug!(camera_id = %camera_id, "Camera session busy");
                None
            }
        }
    }

    async fn get_or_create_lock(&self, camera_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(camera_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(camera_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Signal handed to each capture supervisor
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }

    /// Cancel every running capture and refuse new ones
    pub fn shutdown(&self) {
        tracing::info!("Session manager shutting down");
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of cameras seen so far
    pub async fn camera_count(&self) -> usize {
        self.locks.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to run a session on one camera; released on drop
pub struct SessionLease {
    camera_id: String,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        tracing::debug!(camera_id = %self.camera_id, "Camera session released");
    }
}
