//! Camera Controller type definitions

use crate::error::Error;
use crate::ghost_protocol::CONTROL_PORT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which control surface a camera speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// JSON session protocol over TCP (discovered via UDP beacon)
    Session,
    /// Plain HTTP `/capture` + `/control` endpoints
    Http,
}

impl CameraKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraKind::Session => "session",
            CameraKind::Http => "http",
        }
    }
}

impl std::str::FromStr for CameraKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" | "ghost" | "drift" => Ok(CameraKind::Session),
            "http" | "esp32" => Ok(CameraKind::Http),
            other => Err(Error::Validation(format!("unknown camera kind: {}", other))),
        }
    }
}

/// Identity and address of one camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub id: String,
    /// IP address or host name, without port
    pub address: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    pub kind: CameraKind,
    /// Seconds since camera boot as last reported; lower than before means it was reset
    #[serde(default)]
    pub uptime: u64,
}

fn default_control_port() -> u16 {
    CONTROL_PORT
}

fn default_http_port() -> u16 {
    80
}

impl CameraDescriptor {
    /// Camera speaking the session protocol on the default ports
    pub fn session(id: impl Into<String>, address: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            model: model.into(),
            control_port: CONTROL_PORT,
            http_port: default_http_port(),
            kind: CameraKind::Session,
            uptime: 0,
        }
    }

    /// Camera exposing the plain HTTP endpoints
    pub fn http(id: impl Into<String>, address: impl Into<String>, http_port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            model: String::new(),
            control_port: CONTROL_PORT,
            http_port,
            kind: CameraKind::Http,
            uptime: 0,
        }
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// `http://<address>` (port omitted when it is 80)
    pub fn http_base_url(&self) -> String {
        if self.http_port == 80 {
            format!("http://{}", self.address)
        } else {
            format!("http://{}:{}", self.address, self.http_port)
        }
    }
}

/// Settings applied by the session protocol before each capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub capture_mode: String,
    pub photo_size: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_mode: "precise quality".to_string(),
            photo_size: "12M (4000x3000 4:3)".to_string(),
        }
    }
}

impl CaptureSettings {
    /// Overlay recognised keys from a host settings map
    pub fn merged_with(&self, settings: &HashMap<String, String>) -> Self {
        let mut merged = self.clone();
        if let Some(mode) = settings.get("capture_mode") {
            merged.capture_mode = mode.clone();
        }
        if let Some(size) = settings.get("photo_size") {
            merged.photo_size = size.clone();
        }
        merged
    }
}

/// Terminal result of one capture invocation
#[derive(Debug)]
pub struct CaptureOutcome {
    pub camera_id: String,
    pub local_path: PathBuf,
    pub error: Option<Error>,
}

impl CaptureOutcome {
    pub fn success(camera_id: impl Into<String>, local_path: PathBuf) -> Self {
        Self {
            camera_id: camera_id.into(),
            local_path,
            error: None,
        }
    }

    pub fn failure(camera_id: impl Into<String>, local_path: PathBuf, error: Error) -> Self {
        Self {
            camera_id: camera_id.into(),
            local_path,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> crate::error::Result<PathBuf> {
        match self.error {
            None => Ok(self.local_path),
            Some(e) => Err(e),
        }
    }
}
