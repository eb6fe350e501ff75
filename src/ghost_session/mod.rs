//! Ghost camera capture session
//!
//! start session → capture_mode → photo_size → take photo → photo_complete
//! → HTTP download → delete → stop session, over one TCP connection.
//!
//! - `machine`: pure `(state, event) -> effects` transitions
//! - `connection`: socket I/O and effect execution
//! - `supervisor`: deadline and shutdown handling

pub mod connection;
pub mod machine;
pub mod supervisor;

pub use connection::GhostSession;
pub use machine::{
    Effect, RetryPolicy, SessionEvent, SessionMachine, SessionState, DEFAULT_MAX_CAPTURE_RETRIES,
};
pub use supervisor::{CaptureSupervisor, ShutdownSignal, DEFAULT_CAPTURE_TIMEOUT};
