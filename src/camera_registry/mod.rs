//! CameraRegistry Module
//!
//! Known cameras, keyed by camera id.
//!
//! ## Modules
//! - `types`: registration payload and snapshot results
//! - `service`: insert / reset detection / settings push / discovery
//! - `snapshot`: fan-out capture with timestamped file names
//!
//! ## Example
//! ```rust,ignore
//! let registry = CameraRegistry::new(controllers);
//! registry.discover().await?;
//! let snapshot = registry.snapshot(Path::new("/tmp/sk-cam")).await;
//! ```

pub mod service;
pub mod snapshot;
pub mod types;

pub use service::CameraRegistry;
pub use snapshot::snapshot_prefix;
pub use types::*;
