//! Application state
//!
//! Holds all shared components and state

use crate::camera_controller::{
    CaptureSettings, ControllerSet, GhostCameraController, GhostControllerConfig,
    HttpCameraController,
};
use crate::camera_registry::CameraRegistry;
use crate::discovery::{DiscoveryMode, DEFAULT_TAG, DISCOVERY_PORT};
use crate::error::Result;
use crate::ghost_protocol::CONTROL_PORT;
use crate::ghost_session::{RetryPolicy, DEFAULT_MAX_CAPTURE_RETRIES};
use crate::photo_downloader::PhotoDownloader;
use crate::session_manager::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where snapshots are written
    pub pictures_dir: PathBuf,
    pub capture_timeout_sec: u64,
    /// TAKE_PHOTO re-sends after the first attempt
    pub max_capture_retries: u32,
    pub discovery_port: u16,
    pub discovery_tag: String,
    pub control_port: u16,
    pub capture_mode: String,
    pub photo_size: String,
    /// How long a capture waits for a busy camera
    pub session_wait_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = CaptureSettings::default();
        Self {
            pictures_dir: std::env::var("SK_CAM_PICTURES_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp/sk-cam")),
            capture_timeout_sec: env_or("SK_CAM_CAPTURE_TIMEOUT_SEC", 30),
            max_capture_retries: env_or("SK_CAM_MAX_CAPTURE_RETRIES", DEFAULT_MAX_CAPTURE_RETRIES),
            discovery_port: env_or("SK_CAM_DISCOVERY_PORT", DISCOVERY_PORT),
            discovery_tag: std::env::var("SK_CAM_DISCOVERY_TAG")
                .unwrap_or_else(|_| DEFAULT_TAG.to_string()),
            control_port: env_or("SK_CAM_CONTROL_PORT", CONTROL_PORT),
            capture_mode: std::env::var("SK_CAM_CAPTURE_MODE").unwrap_or(settings.capture_mode),
            photo_size: std::env::var("SK_CAM_PHOTO_SIZE").unwrap_or(settings.photo_size),
            session_wait_ms: env_or("SK_CAM_SESSION_WAIT_MS", 5000),
        }
    }
}

impl AppConfig {
    pub fn ghost_config(&self, discovery_mode: DiscoveryMode) -> GhostControllerConfig {
        GhostControllerConfig {
            capture_timeout: Duration::from_secs(self.capture_timeout_sec),
            retry: RetryPolicy {
                max_capture_retries: self.max_capture_retries,
            },
            default_settings: CaptureSettings {
                capture_mode: self.capture_mode.clone(),
                photo_size: self.photo_size.clone(),
            },
            discovery_port: self.discovery_port,
            discovery_tag: self.discovery_tag.clone(),
            discovery_mode,
            control_port: self.control_port,
        }
    }
}

/// Application state shared across commands
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Per-camera session leases and host shutdown
    pub sessions: Arc<SessionManager>,
    pub controllers: ControllerSet,
    pub registry: Arc<CameraRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, discovery_mode: DiscoveryMode) -> Result<Self> {
        let sessions = Arc::new(SessionManager::with_timeout(config.session_wait_ms));
        let downloader = PhotoDownloader::new()?;

        let ghost = Arc::new(GhostCameraController::new(
            config.ghost_config(discovery_mode),
            sessions.clone(),
            downloader.clone(),
        ));
        let http = Arc::new(HttpCameraController::new(sessions.clone(), downloader));
        let controllers = ControllerSet::new(ghost, http);
        let registry = Arc::new(CameraRegistry::new(controllers.clone()));

        Ok(Self {
            config,
            sessions,
            controllers,
            registry,
        })
    }

    /// Cancel running captures and discovery
    pub fn shutdown(&self) {
        self.sessions.shutdown();
    }
}
