//! Bare TCP reachability probe.

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;
use vigil_wire::{ServiceAddr, Status};

/// Probes a target by connecting and immediately closing.
///
/// No payload is ever exchanged; reachability is the whole check.
pub struct TcpProber {
    timeout_duration: Duration,
}

impl TcpProber {
    pub fn new(timeout_duration: Duration) -> Self {
        Self { timeout_duration }
    }

    /// One connect-then-close attempt.
    ///
    /// A refused connection is the routine DOWN verdict. Timeouts and other
    /// transport errors are also DOWN, logged so they stay distinguishable
    /// from plain refusal.
    pub async fn probe(&self, service: &ServiceAddr) -> Status {
        let connect = tokio::net::TcpStream::connect(service.endpoint());

        match timeout(self.timeout_duration, connect).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Status::Up
            }
            Ok(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => Status::Down,
            Ok(Err(err)) => {
                warn!(service = %service, error = %err, "probe failed with unexpected error");
                Status::Down
            }
            Err(_) => {
                warn!(service = %service, timeout_secs = self.timeout_duration.as_secs(), "probe timed out");
                Status::Down
            }
        }
    }
}
