//! Fan-out capture of every registered camera
//!
//! All captures share one timestamp prefix so the files of one snapshot sort
//! together: `cam-2024-05-01-12-30-00_<camera_id>.jpg`.

use super::service::CameraRegistry;
use super::types::{Snapshot, SnapshotEntry};
use crate::error::Error;
use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use std::path::Path;
use tracing::{info, warn};

/// `cam-YYYY-MM-DD-HH-mm-ss`
pub fn snapshot_prefix(at: &NaiveDateTime) -> String {
    format!("cam-{}", at.format("%Y-%m-%d-%H-%M-%S"))
}

/// Failures that say nothing about the camera itself keep it registered
fn keeps_camera(err: &Error) -> bool {
    matches!(err, Error::Busy(_) | Error::Cancelled(_))
}

impl CameraRegistry {
    /// Capture every known camera into `pictures_dir`
    pub async fn snapshot(&self, pictures_dir: &Path) -> Snapshot {
        self.snapshot_at(pictures_dir, Local::now().naive_local()).await
    }

    pub async fn snapshot_at(&self, pictures_dir: &Path, at: NaiveDateTime) -> Snapshot {
        let prefix = snapshot_prefix(&at);
        let cameras = self.list().await;

        info!(prefix = %prefix, cameras = cameras.len(), "Taking snapshot");

        let captures = cameras.iter().map(|camera| {
            let filename = format!("{}_{}.jpg", prefix, camera.id);
            let path = pictures_dir.join(&filename);
            let controller = self.controllers().for_kind(camera.kind);
            async move {
                let outcome = controller.capture_jpeg(camera, &path).await;
                (filename, outcome)
            }
        });

        let mut entries = Vec::with_capacity(cameras.len());
        let mut removed = Vec::new();

        for (filename, outcome) in join_all(captures).await {
            let camera_id = outcome.camera_id.clone();
            match outcome.error {
                None => entries.push(SnapshotEntry {
                    camera_id,
                    filename,
                    success: true,
                    error_code: None,
                    error: None,
                }),
                Some(err) => {
                    warn!(
                        camera_id = %camera_id,
                        error = %err,
                        unreachable = err.is_unreachable(),
                        "Snapshot capture failed"
                    );
                    if !keeps_camera(&err) {
                        self.remove(&camera_id).await;
                        removed.push(camera_id.clone());
                    }
                    entries.push(SnapshotEntry {
                        camera_id,
                        filename,
                        success: false,
                        error_code: Some(err.error_code().to_string()),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let snapshot = Snapshot {
            prefix,
            entries,
            removed,
        };
        info!(
            prefix = %snapshot.prefix,
            succeeded = snapshot.success_count(),
            removed = snapshot.removed.len(),
            "Snapshot complete"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_controller::CameraDescriptor;
    use crate::camera_registry::service::tests::registry;
    use crate::ghost_session::tests::{temp_dest, unused_port};
    use axum::{routing::get, Router};
    use chrono::NaiveDate;
    use tokio::net::TcpListener;

    const JPEG: &[u8] = b"\xFF\xD8\xFFsnap\xFF\xD9";

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 7)
            .unwrap()
    }

    async fn http_camera_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let router = Router::new()
            .route("/capture", get(|| async { JPEG }))
            .route("/control", get(|| async { "ok" }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    #[test]
    fn test_snapshot_prefix() {
        assert_eq!(snapshot_prefix(&at()), "cam-2024-05-01-12-30-07");
    }

    #[test]
    fn test_transient_errors_keep_camera() {
        assert!(keeps_camera(&Error::Busy("cam-1".to_string())));
        assert!(!keeps_camera(&Error::Download("probe failed".to_string())));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let snapshot = registry().snapshot_at(&temp_dest(), at()).await;
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.removed.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_captures_and_drops_failed_cameras() {
        let registry = registry();
        let good = http_camera_server().await;
        registry.insert(CameraDescriptor::http("CAM_1", "127.0.0.1", good)).await;
        registry
            .insert(CameraDescriptor::http("CAM_2", "127.0.0.1", unused_port().await))
            .await;

        let dir = temp_dest().parent().unwrap().to_path_buf();
        let snapshot = registry.snapshot_at(&dir, at()).await;

        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.success_count(), 1);
        assert_eq!(snapshot.removed, vec!["CAM_2"]);

        let ok = &snapshot.entries[0];
        assert_eq!(ok.filename, "cam-2024-05-01-12-30-07_CAM_1.jpg");
        assert_eq!(std::fs::read(dir.join(&ok.filename)).unwrap(), JPEG);

        let failed = &snapshot.entries[1];
        assert!(!failed.success);
        assert_eq!(failed.error_code.as_deref(), Some("DOWNLOAD_ERROR"));

        assert!(registry.get("CAM_1").await.is_some());
        assert!(registry.get("CAM_2").await.is_none());
    }
}
