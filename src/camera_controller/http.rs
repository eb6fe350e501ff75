//! HTTP-only camera controller
//!
//! These cameras register themselves with the host, so there is nothing to
//! detect. Capture is a single `/capture` download; each setting is one
//! `/control?var=<name>&val=<value>` request.

use super::{CameraController, CameraDescriptor, CameraKind, CaptureOutcome, FoundHandler};
use crate::error::{Error, Result};
use crate::ghost_session::supervisor::shutdown_requested;
use crate::photo_downloader::{discard_partial, PhotoDownloader};
use crate::session_manager::SessionManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct HttpCameraController {
    sessions: Arc<SessionManager>,
    downloader: PhotoDownloader,
}

impl HttpCameraController {
    pub fn new(sessions: Arc<SessionManager>, downloader: PhotoDownloader) -> Self {
        Self {
            sessions,
            downloader,
        }
    }

    async fn run_capture(&self, camera: &CameraDescriptor, destination: &Path) -> Result<PathBuf> {
        let _lease = self.sessions.acquire(&camera.id).await?;
        let url = format!("{}/capture", camera.http_base_url());
        let mut shutdown = self.sessions.shutdown_signal();

        let bytes = tokio::select! {
            result = self.downloader.fetch_to_file(&url, destination) => result?,
            _ = shutdown_requested(Some(&mut shutdown)) => {
                tracing::warn!(camera_id = %camera.id, "Capture cancelled by shutdown");
                discard_partial(destination).await;
                return Err(Error::Cancelled("host shutdown".to_string()));
            }
        };
        tracing::info!(
            camera_id = %camera.id,
            path = %destination.display(),
            size = bytes,
            "Received photo"
        );
        Ok(destination.to_path_buf())
    }

    async fn apply_setting(&self, camera: &CameraDescriptor, var: &str, val: &str) -> Result<()> {
        let url = format!("{}/control", camera.http_base_url());
        let resp = self
            .downloader
            .client()
            .get(&url)
            .query(&[("var", var), ("val", val)])
            .send()
            .await
            .map_err(|e| Error::Connection(format!("control {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Protocol(format!(
                "control {}={} returned {}",
                var,
                val,
                resp.status()
            )));
        }

        tracing::debug!(camera_id = %camera.id, var = %var, val = %val, "Setting applied");
        Ok(())
    }
}

#[async_trait]
impl CameraController for HttpCameraController {
    fn kind(&self) -> CameraKind {
        CameraKind::Http
    }

    async fn detect_cameras(&self, _on_found: FoundHandler<'_>) -> Result<()> {
        Ok(())
    }

    async fn capture_jpeg(&self, camera: &CameraDescriptor, destination: &Path) -> CaptureOutcome {
        match self.run_capture(camera, destination).await {
            Ok(path) => CaptureOutcome::success(&camera.id, path),
            Err(e) => {
                tracing::warn!(camera_id = %camera.id, error = %e, "Capture failed");
                CaptureOutcome::failure(&camera.id, destination.to_path_buf(), e)
            }
        }
    }

    async fn configure_camera(
        &self,
        camera: &CameraDescriptor,
        settings: &HashMap<String, String>,
    ) -> Result<()> {
        let mut names: Vec<&String> = settings.keys().collect();
        names.sort();

        for name in names {
            self.apply_setting(camera, name, &settings[name]).await?;
        }

        tracing::info!(camera_id = %camera.id, count = settings.len(), "Camera configured");
        Ok(())
    }
}
