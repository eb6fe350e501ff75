//! CameraRegistry - the set of cameras the host knows about
//!
//! ## Flow
//! 1. Cameras arrive from discovery beacons or HTTP registration
//! 2. New or reset cameras get the current settings pushed
//! 3. Snapshots capture every known camera; unreachable ones are dropped

use super::types::{CameraInfo, InsertOutcome};
use crate::camera_controller::{CameraDescriptor, CameraKind, ControllerSet};
use crate::error::Result;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Default settings for HTTP-only cameras
fn default_http_settings() -> HashMap<String, String> {
    HashMap::from([
        ("framesize".to_string(), "13".to_string()),
        ("quality".to_string(), "10".to_string()),
    ])
}

pub struct CameraRegistry {
    cameras: RwLock<HashMap<String, CameraDescriptor>>,
    /// Settings pushed to each camera kind
    settings: RwLock<HashMap<CameraKind, HashMap<String, String>>>,
    controllers: ControllerSet,
}

impl CameraRegistry {
    pub fn new(controllers: ControllerSet) -> Self {
        let settings = HashMap::from([
            (CameraKind::Session, HashMap::new()),
            (CameraKind::Http, default_http_settings()),
        ]);

        Self {
            cameras: RwLock::new(HashMap::new()),
            settings: RwLock::new(settings),
            controllers,
        }
    }

    pub fn controllers(&self) -> &ControllerSet {
        &self.controllers
    }

    /// Record a camera; configure it when it is new or was reset
    pub async fn insert(&self, camera: CameraDescriptor) -> InsertOutcome {
        let outcome = {
            let mut cameras = self.cameras.write().await;
            let outcome = match cameras.get(&camera.id) {
                None => InsertOutcome::New,
                Some(prev) if camera.uptime < prev.uptime => InsertOutcome::Reset,
                Some(_) => InsertOutcome::Updated,
            };
            cameras.insert(camera.id.clone(), camera.clone());
            outcome
        };

        match outcome {
            InsertOutcome::New => info!(camera_id = %camera.id, kind = camera.kind.as_str(), "New camera connected"),
            InsertOutcome::Reset => info!(camera_id = %camera.id, uptime = camera.uptime, "Camera was reset"),
            InsertOutcome::Updated => debug!(camera_id = %camera.id, "Camera update"),
        }

        if outcome.needs_configure() {
            if let Err(e) = self.configure(&camera).await {
                warn!(camera_id = %camera.id, error = %e, "Failed to configure camera");
            }
        }
        outcome
    }

    /// Registration pushed by an HTTP-only camera
    pub async fn register_http_camera(&self, info: CameraInfo) -> Result<InsertOutcome> {
        let camera = info.into_descriptor()?;
        Ok(self.insert(camera).await)
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraDescriptor> {
        self.cameras.read().await.get(camera_id).cloned()
    }

    /// Known cameras ordered by id
    pub async fn list(&self) -> Vec<CameraDescriptor> {
        let mut cameras: Vec<_> = self.cameras.read().await.values().cloned().collect();
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        cameras
    }

    pub async fn remove(&self, camera_id: &str) -> Option<CameraDescriptor> {
        let removed = self.cameras.write().await.remove(camera_id);
        if removed.is_some() {
            info!(camera_id = %camera_id, "Camera removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.cameras.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cameras.read().await.is_empty()
    }

    pub async fn settings_for(&self, kind: CameraKind) -> HashMap<String, String> {
        self.settings.read().await.get(&kind).cloned().unwrap_or_default()
    }

    /// Store new settings for `kind` and push them to every camera of that kind
    ///
    /// Returns the number of cameras configured successfully.
    pub async fn update_settings(&self, kind: CameraKind, settings: HashMap<String, String>) -> usize {
        self.settings.write().await.insert(kind, settings);

        let mut configured = 0;
        for camera in self.list().await.into_iter().filter(|c| c.kind == kind) {
            match self.configure(&camera).await {
                Ok(()) => configured += 1,
                Err(e) => warn!(camera_id = %camera.id, error = %e, "Failed to configure camera"),
            }
        }
        configured
    }

    async fn configure(&self, camera: &CameraDescriptor) -> Result<()> {
        let settings = self.settings_for(camera.kind).await;
        if settings.is_empty() {
            return Ok(());
        }
        self.controllers
            .for_kind(camera.kind)
            .configure_camera(camera, &settings)
            .await
    }

    /// Run session-camera discovery, inserting every camera found
    ///
    /// Returns when discovery stops (first beacon or shutdown, depending on
    /// the controller's discovery mode).
    pub async fn discover(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = self.controllers.for_kind(CameraKind::Session);

        let detect = async move {
            let mut on_found = move |camera: CameraDescriptor| {
                forward_found(&tx, camera);
            };
            controller.detect_cameras(&mut on_found).await
        };
        let inserts = async {
            while let Some(camera) = rx.recv().await {
                self.insert(camera).await;
            }
        };

        let (result, ()) = tokio::join!(detect, inserts);
        result
    }
}

/// Queue a discovered camera for insertion; false if the inserter is gone
fn forward_found(tx: &mpsc::UnboundedSender<CameraDescriptor>, camera: CameraDescriptor) -> bool {
    match tx.send(camera) {
        Ok(()) => true,
        Err(mpsc::error::SendError(camera)) => {
            debug!(camera_id = %camera.id, address = %camera.address, "Discovery result dropped");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera_controller::{GhostCameraController, GhostControllerConfig, HttpCameraController};
    use crate::discovery::DiscoveryMode;
    use crate::ghost_session::tests::unused_port;
    use crate::photo_downloader::PhotoDownloader;
    use crate::session_manager::SessionManager;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn controllers(config: GhostControllerConfig) -> ControllerSet {
        let sessions = Arc::new(SessionManager::new());
        let downloader = PhotoDownloader::new().unwrap();
        ControllerSet::new(
            Arc::new(GhostCameraController::new(config, sessions.clone(), downloader.clone())),
            Arc::new(HttpCameraController::new(sessions, downloader)),
        )
    }

    pub(crate) fn registry() -> CameraRegistry {
        CameraRegistry::new(controllers(GhostControllerConfig::default()))
    }

    fn session_camera(id: &str, uptime: u64) -> CameraDescriptor {
        let mut cam = CameraDescriptor::session(id, "127.0.0.1", "XL");
        cam.uptime = uptime;
        cam
    }

    #[tokio::test]
    async fn test_insert_detects_new_and_reset() {
        let registry = registry();

        assert_eq!(registry.insert(session_camera("cam-1", 100)).await, InsertOutcome::New);
        assert_eq!(registry.insert(session_camera("cam-1", 160)).await, InsertOutcome::Updated);
        assert_eq!(registry.insert(session_camera("cam-1", 5)).await, InsertOutcome::Reset);
        assert_eq!(registry.get("cam-1").await.unwrap().uptime, 5);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_sorted_and_remove() {
        let registry = registry();
        registry.insert(session_camera("cam-b", 0)).await;
        registry.insert(session_camera("cam-a", 0)).await;

        let ids: Vec<_> = registry.list().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["cam-a", "cam-b"]);

        assert!(registry.remove("cam-a").await.is_some());
        assert!(registry.remove("cam-a").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_session_settings_reach_controller() {
        let registry = registry();
        registry.insert(session_camera("cam-1", 0)).await;

        let settings = HashMap::from([("capture_mode".to_string(), "fast".to_string())]);
        assert_eq!(registry.update_settings(CameraKind::Session, settings).await, 1);

        let applied = registry.controllers().ghost().settings_for("cam-1").await;
        assert_eq!(applied.capture_mode, "fast");
    }

    #[tokio::test]
    async fn test_unreachable_http_camera_still_registered() {
        let registry = registry();
        let info = CameraInfo {
            id: 26,
            ip: "127.0.0.1".to_string(),
            camera_port: unused_port().await,
            stream_port: 81,
            rssi: 0,
            uptime: 1,
        };

        // configure fails, registration does not
        let outcome = registry.register_http_camera(info).await.unwrap();
        assert_eq!(outcome, InsertOutcome::New);
        assert!(registry.get("CAM_1A").await.is_some());
        assert_eq!(registry.settings_for(CameraKind::Http).await["quality"], "10");
    }

    #[test]
    fn test_forward_found_after_inserter_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(forward_found(&tx, CameraDescriptor::session("cam-1", "10.0.0.1", "XL")));
        drop(rx);
        assert!(!forward_found(&tx, CameraDescriptor::session("cam-2", "10.0.0.2", "XL")));
    }

    #[tokio::test]
    async fn test_discover_inserts_beacon_camera() {
        let port = unused_port().await;
        let registry = CameraRegistry::new(controllers(GhostControllerConfig {
            discovery_port: port,
            discovery_mode: DiscoveryMode::FirstBeacon,
            ..Default::default()
        }));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
            sender.send_to(b"SKCAM|cam-5|XL", ("127.0.0.1", port)).await.unwrap();
        });

        tokio::time::timeout(Duration::from_secs(5), registry.discover())
            .await
            .unwrap()
            .unwrap();

        let cam = registry.get("cam-5").await.unwrap();
        assert_eq!(cam.address, "127.0.0.1");
        assert_eq!(cam.kind, CameraKind::Session);
    }
}
