//! Wire types for the vigil monitoring protocol.
//!
//! The control channel is a strict request/reply exchange of JSON objects;
//! the data channel is a three-frame pub/sub message whose first frame is
//! the subscription topic. Both sides of the system depend on this crate so
//! the two binaries can never drift apart on message shape.

pub mod protocol;
pub mod status;

pub use protocol::{Reply, Request};
pub use status::{ClientId, FrameError, ServiceAddr, Status, StatusRecord};
