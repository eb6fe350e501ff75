//! Session-protocol camera controller
//!
//! Detection listens for UDP beacons; capture runs one supervised
//! [`GhostSession`] while holding the camera's session lease.

use super::{CameraController, CameraDescriptor, CameraKind, CaptureOutcome, CaptureSettings, FoundHandler};
use crate::discovery::{DiscoveryListener, DiscoveryMode, DEFAULT_TAG, DISCOVERY_PORT};
use crate::error::{Error, Result};
use crate::ghost_protocol::CONTROL_PORT;
use crate::ghost_session::{CaptureSupervisor, GhostSession, RetryPolicy, DEFAULT_CAPTURE_TIMEOUT};
use crate::photo_downloader::PhotoDownloader;
use crate::session_manager::SessionManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct GhostControllerConfig {
    pub capture_timeout: Duration,
    pub retry: RetryPolicy,
    /// Applied to cameras that were never configured
    pub default_settings: CaptureSettings,
    pub discovery_port: u16,
    pub discovery_tag: String,
    pub discovery_mode: DiscoveryMode,
    /// Control port assigned to discovered cameras
    pub control_port: u16,
}

impl Default for GhostControllerConfig {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            retry: RetryPolicy::default(),
            default_settings: CaptureSettings::default(),
            discovery_port: DISCOVERY_PORT,
            discovery_tag: DEFAULT_TAG.to_string(),
            discovery_mode: DiscoveryMode::Continuous,
            control_port: CONTROL_PORT,
        }
    }
}

pub struct GhostCameraController {
    config: GhostControllerConfig,
    sessions: Arc<SessionManager>,
    downloader: PhotoDownloader,
    /// camera_id -> settings from configure_camera
    settings: RwLock<HashMap<String, CaptureSettings>>,
}

impl GhostCameraController {
    pub fn new(
        config: GhostControllerConfig,
        sessions: Arc<SessionManager>,
        downloader: PhotoDownloader,
    ) -> Self {
        Self {
            config,
            sessions,
            downloader,
            settings: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GhostControllerConfig {
        &self.config
    }

    /// Settings the next capture of `camera_id` will apply
    pub async fn settings_for(&self, camera_id: &str) -> CaptureSettings {
        self.settings
            .read()
            .await
            .get(camera_id)
            .cloned()
            .unwrap_or_else(|| self.config.default_settings.clone())
    }

    async fn run_capture(&self, camera: &CameraDescriptor, destination: &Path) -> Result<std::path::PathBuf> {
        if camera.kind != CameraKind::Session {
            return Err(Error::Validation(format!(
                "camera {} is not a session camera",
                camera.id
            )));
        }

        let _lease = self.sessions.acquire(&camera.id).await?;
        let settings = self.settings_for(&camera.id).await;

        let mut session = GhostSession::new(
            camera.clone(),
            destination.to_path_buf(),
            settings,
            self.config.retry,
            self.downloader.clone(),
        );

        CaptureSupervisor::new(self.config.capture_timeout)
            .with_shutdown(self.sessions.shutdown_signal())
            .supervise(&mut session)
            .await
    }
}

#[async_trait]
impl CameraController for GhostCameraController {
    fn kind(&self) -> CameraKind {
        CameraKind::Session
    }

    async fn detect_cameras(&self, on_found: FoundHandler<'_>) -> Result<()> {
        let listener =
            DiscoveryListener::bind(self.config.discovery_port, self.config.discovery_tag.clone()).await?;
        let control_port = self.config.control_port;

        listener
            .run(
                self.config.discovery_mode,
                |found| on_found(found.descriptor().with_control_port(control_port)),
                Some(self.sessions.shutdown_signal()),
            )
            .await?;
        Ok(())
    }

    async fn capture_jpeg(&self, camera: &CameraDescriptor, destination: &Path) -> CaptureOutcome {
        tracing::info!(
            camera_id = %camera.id,
            address = %camera.address,
            destination = %destination.display(),
            "Capture requested"
        );

        match self.run_capture(camera, destination).await {
            Ok(path) => {
                tracing::info!(camera_id = %camera.id, path = %path.display(), "Capture complete");
                CaptureOutcome::success(&camera.id, path)
            }
            Err(e) => {
                tracing::warn!(camera_id = %camera.id, error = %e, "Capture failed");
                CaptureOutcome::failure(&camera.id, destination.to_path_buf(), e)
            }
        }
    }

    /// Settings are sent at the start of every session, so they are stored
    /// here and applied on the next capture.
    async fn configure_camera(
        &self,
        camera: &CameraDescriptor,
        settings: &HashMap<String, String>,
    ) -> Result<()> {
        if let Some(key) = settings
            .keys()
            .find(|k| !matches!(k.as_str(), "capture_mode" | "photo_size"))
        {
            return Err(Error::Validation(format!("unsupported setting: {}", key)));
        }

        let merged = self.settings_for(&camera.id).await.merged_with(settings);
        tracing::info!(
            camera_id = %camera.id,
            capture_mode = %merged.capture_mode,
            photo_size = %merged.photo_size,
            "Camera settings stored"
        );
        self.settings.write().await.insert(camera.id.clone(), merged);
        Ok(())
    }
}
