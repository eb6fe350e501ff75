//! sk-cam library
//!
//! Remote-capture driver for network cameras.
//!
//! ## Components
//!
//! 1. MessageFramer - JSON values out of an undelimited TCP byte stream
//! 2. Discovery - UDP beacon listener
//! 3. PhotoDownloader - HEAD probe + streamed GET of captured photos
//! 4. GhostSession - session state machine, connection driver, deadline supervisor
//! 5. SessionManager - one live session per camera, host shutdown
//! 6. CameraController - `detect_cameras` / `capture_jpeg` / `configure_camera`
//! 7. CameraRegistry - known cameras, reset detection, fan-out snapshots

pub mod camera_controller;
pub mod camera_registry;
pub mod discovery;
pub mod error;
pub mod ghost_protocol;
pub mod ghost_session;
pub mod photo_downloader;
pub mod session_manager;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
