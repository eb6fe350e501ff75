//! Ghost camera control protocol
//!
//! JSON-over-TCP command channel: message shapes, command ids and the
//! incremental framer that turns socket chunks into messages.

pub mod framer;
pub mod types;

pub use framer::MessageFramer;
pub use types::*;
