//! Per-service publishing handle for status records.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use vigil_wire::StatusRecord;

use super::gates::PublishGate;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish transport: {0}")]
    Transport(#[from] zmq::Error),
    #[error("record encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One PUB socket per monitored service, connected to the relay frontend
/// and shared by every worker polling that service.
///
/// Sends are serialized by the process-wide [`PublishGate`]; the inner
/// mutex only makes the socket handle shareable across worker tasks.
pub struct StatusPublisher {
    socket: Mutex<zmq::Socket>,
    gate: Arc<PublishGate>,
}

impl StatusPublisher {
    /// Establish the publishing transport toward the relay frontend.
    /// Failure here means the service cannot be registered.
    pub fn connect(
        ctx: &zmq::Context,
        relay_frontend: &str,
        gate: Arc<PublishGate>,
    ) -> Result<Self, PublishError> {
        let socket = ctx.socket(zmq::PUB)?;
        socket.connect(relay_frontend)?;
        Ok(Self { socket: Mutex::new(socket), gate })
    }

    /// Send one record as a single three-frame message.
    pub async fn publish(&self, record: &StatusRecord) -> Result<(), PublishError> {
        let frames = record.to_frames()?;
        let _order = self.gate.acquire().await;
        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        socket.send_multipart(frames, 0)?;
        Ok(())
    }
}
