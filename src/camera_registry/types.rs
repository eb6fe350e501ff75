//! CameraRegistry type definitions

use crate::camera_controller::CameraDescriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Registration payload pushed by an HTTP-only camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Numeric chip id; the camera id is `CAM_<hex>`
    pub id: u64,
    pub ip: String,
    pub camera_port: u16,
    pub stream_port: u16,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub uptime: u64,
}

impl CameraInfo {
    /// `CAM_<upper hex id>`
    pub fn camera_id(&self) -> String {
        format!("CAM_{:X}", self.id)
    }

    pub fn stream_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.stream_port)
    }

    pub fn into_descriptor(self) -> Result<CameraDescriptor> {
        if self.ip.trim().is_empty() || self.camera_port == 0 {
            return Err(Error::Validation(format!(
                "invalid camera info for {}",
                self.camera_id()
            )));
        }

        let mut camera = CameraDescriptor::http(self.camera_id(), self.ip, self.camera_port);
        camera.uptime = self.uptime;
        Ok(camera)
    }
}

/// What inserting a camera changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First time this id was seen
    New,
    /// Known id reporting a lower uptime
    Reset,
    Updated,
}

impl InsertOutcome {
    /// New and reset cameras need their settings pushed again
    pub fn needs_configure(&self) -> bool {
        matches!(self, InsertOutcome::New | InsertOutcome::Reset)
    }
}

/// One camera's part of a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub camera_id: String,
    /// File name inside the pictures directory
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of capturing every known camera at once
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// `cam-YYYY-MM-DD-HH-mm-ss`
    pub prefix: String,
    pub entries: Vec<SnapshotEntry>,
    /// Cameras dropped from the registry because they could not be reached
    pub removed: Vec<String>,
}

impl Snapshot {
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_controller::CameraKind;

    fn info() -> CameraInfo {
        CameraInfo {
            id: 11259375,
            ip: "10.0.0.7".to_string(),
            camera_port: 80,
            stream_port: 81,
            rssi: -60,
            uptime: 42,
        }
    }

    #[test]
    fn test_camera_id_is_upper_hex() {
        assert_eq!(info().camera_id(), "CAM_ABCDEF");
        assert_eq!(info().stream_url(), "http://10.0.0.7:81");
    }

    #[test]
    fn test_into_descriptor() {
        let cam = info().into_descriptor().unwrap();
        assert_eq!(cam.id, "CAM_ABCDEF");
        assert_eq!(cam.kind, CameraKind::Http);
        assert_eq!(cam.uptime, 42);
        assert_eq!(cam.http_base_url(), "http://10.0.0.7");
    }

    #[test]
    fn test_into_descriptor_rejects_missing_ip() {
        let mut bad = info();
        bad.ip = " ".to_string();
        assert!(matches!(bad.into_descriptor(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_camera_info_json() {
        let parsed: CameraInfo =
            serde_json::from_str(r#"{"id":255,"ip":"10.0.0.9","camera_port":80,"stream_port":81}"#).unwrap();
        assert_eq!(parsed.camera_id(), "CAM_FF");
        assert_eq!(parsed.uptime, 0);
    }
}
