//! Error handling for sk-cam

use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket-level failure on the control channel
    #[error("Connection error: {0}")]
    Connection(String),

    /// Capture deadline elapsed before a terminal protocol state
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Unparseable or structurally invalid protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device answered rval != 0 at session start or configuration
    #[error("Session error: {message} (rval={rval})")]
    Session { message: String, rval: i64 },

    /// TAKE_PHOTO retries exhausted
    #[error("Capture failed after {attempts} attempts")]
    CaptureFailed { attempts: u32 },

    /// HTTP retrieval failure
    #[error("Download error: {0}")]
    Download(String),

    /// Delete/stop failure after the photo was retrieved (never surfaced as capture failure)
    #[error("Device cleanup error: {0}")]
    DeviceCleanup(String),

    /// Host shutdown resolved a pending capture
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Another session is already live on the camera
    #[error("Camera {0} busy")]
    Busy(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code, used in logs and by the host
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::Timeout(_) => "TIMEOUT_ERROR",
            Error::Protocol(_) => "PROTOCOL_ERROR",
            Error::Session { .. } => "SESSION_ERROR",
            Error::CaptureFailed { .. } => "CAPTURE_FAILED",
            Error::Download(_) => "DOWNLOAD_ERROR",
            Error::DeviceCleanup(_) => "DEVICE_CLEANUP_ERROR",
            Error::Cancelled(_) => "CANCELLED",
            Error::Busy(_) => "CAMERA_BUSY",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the error means the camera could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::Io(_) | Error::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Timeout(Duration::from_secs(30)).error_code(), "TIMEOUT_ERROR");
        assert_eq!(
            Error::CaptureFailed { attempts: 4 }.error_code(),
            "CAPTURE_FAILED"
        );
        assert_eq!(
            Error::Session {
                message: "start".into(),
                rval: -4
            }
            .to_string(),
            "Session error: start (rval=-4)"
        );
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(Error::Connection("refused".into()).is_unreachable());
        assert!(Error::Timeout(Duration::from_millis(200)).is_unreachable());
        assert!(!Error::Download("404".into()).is_unreachable());
        assert!(!Error::CaptureFailed { attempts: 1 }.is_unreachable());
    }
}
