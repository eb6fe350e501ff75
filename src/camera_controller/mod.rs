//! CameraController - uniform capability contract consumed by the host
//!
//! ```text
//! detect_cameras(on_found)           -> report cameras as they appear
//! capture_jpeg(camera, destination)  -> exactly one CaptureOutcome
//! configure_camera(camera, settings) -> apply camera-specific settings
//! ```
//!
//! Two implementations, selected by [`CameraKind`]:
//! - [`GhostCameraController`]: JSON session protocol over TCP
//! - [`HttpCameraController`]: plain HTTP `/capture` + `/control`

pub mod ghost;
pub mod http;
pub mod types;

pub use ghost::{GhostCameraController, GhostControllerConfig};
pub use http::HttpCameraController;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Callback receiving each detected camera
pub type FoundHandler<'a> = &'a mut (dyn FnMut(CameraDescriptor) + Send);

#[async_trait]
pub trait CameraController: Send + Sync {
    fn kind(&self) -> CameraKind;

    /// Report cameras as they are found
    async fn detect_cameras(&self, on_found: FoundHandler<'_>) -> Result<()>;

    /// Capture one photo into `destination`; never fails outside the outcome
    async fn capture_jpeg(&self, camera: &CameraDescriptor, destination: &Path) -> CaptureOutcome;

    async fn configure_camera(
        &self,
        camera: &CameraDescriptor,
        settings: &HashMap<String, String>,
    ) -> Result<()>;
}

/// One controller per camera kind
#[derive(Clone)]
pub struct ControllerSet {
    ghost: Arc<GhostCameraController>,
    http: Arc<HttpCameraController>,
}

impl ControllerSet {
    pub fn new(ghost: Arc<GhostCameraController>, http: Arc<HttpCameraController>) -> Self {
        Self { ghost, http }
    }

    pub fn for_kind(&self, kind: CameraKind) -> Arc<dyn CameraController> {
        match kind {
            CameraKind::Session => self.ghost.clone(),
            CameraKind::Http => self.http.clone(),
        }
    }

    pub fn ghost(&self) -> &Arc<GhostCameraController> {
        &self.ghost
    }

    pub fn http(&self) -> &Arc<HttpCameraController> {
        &self.http
    }
}
