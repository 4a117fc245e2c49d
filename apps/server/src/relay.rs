//! Pub/sub relay bridging polling workers to subscribing clients.
//!
//! Workers connect PUB sockets to the frontend; clients connect SUB sockets
//! to the backend. The relay forwards every frame verbatim and never looks
//! inside a message. Topic filtering is a subscriber concern.

use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay socket setup failed: {0}")]
    Socket(#[from] zmq::Error),
    #[error("relay bound to an unparseable endpoint")]
    Endpoint,
}

pub struct Relay {
    frontend: zmq::Socket,
    backend: zmq::Socket,
    frontend_port: u16,
    backend_port: u16,
}

impl Relay {
    /// Bind both relay endpoints. A failure here must abort server startup.
    ///
    /// Port 0 binds an ephemeral port; the resolved ports are available
    /// afterwards so tests can run several independent instances.
    pub fn bind(
        ctx: &zmq::Context,
        bind: &str,
        frontend_port: u16,
        backend_port: u16,
    ) -> Result<Self, RelayError> {
        let frontend = ctx.socket(zmq::SUB)?;
        frontend.set_subscribe(b"")?;
        frontend.bind(&tcp_endpoint(bind, frontend_port))?;

        let backend = ctx.socket(zmq::PUB)?;
        backend.bind(&tcp_endpoint(bind, backend_port))?;

        let frontend_port = bound_port(&frontend)?;
        let backend_port = bound_port(&backend)?;
        info!(frontend_port, backend_port, "relay bound");

        Ok(Self { frontend, backend, frontend_port, backend_port })
    }

    /// Port workers publish into.
    pub fn frontend_port(&self) -> u16 {
        self.frontend_port
    }

    /// Port subscribers read from.
    pub fn backend_port(&self) -> u16 {
        self.backend_port
    }

    /// Forward until the context is torn down. Runs on its own thread.
    pub fn run(self) {
        if let Err(err) = zmq::proxy(&self.frontend, &self.backend) {
            // ETERM is the normal exit when the context shuts down
            if err == zmq::Error::ETERM {
                info!("relay stopped");
            } else {
                error!(error = %err, "relay terminated unexpectedly");
            }
        }
    }
}

/// `tcp://` endpoint string; port 0 asks the transport for an ephemeral one.
pub(crate) fn tcp_endpoint(bind: &str, port: u16) -> String {
    if port == 0 {
        format!("tcp://{bind}:*")
    } else {
        format!("tcp://{bind}:{port}")
    }
}

/// Resolve the port a socket actually bound, wildcard binds included.
fn bound_port(socket: &zmq::Socket) -> Result<u16, RelayError> {
    let last = socket
        .get_last_endpoint()?
        .map_err(|_| RelayError::Endpoint)?;
    last.rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
        .ok_or(RelayError::Endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_bind_reports_real_ports() {
        let ctx = zmq::Context::new();
        let relay = Relay::bind(&ctx, "127.0.0.1", 0, 0).unwrap();
        assert_ne!(relay.frontend_port(), 0);
        assert_ne!(relay.backend_port(), 0);
        assert_ne!(relay.frontend_port(), relay.backend_port());
    }

    #[test]
    fn rebinding_a_taken_port_fails() {
        let ctx = zmq::Context::new();
        let relay = Relay::bind(&ctx, "127.0.0.1", 0, 0).unwrap();
        let taken = relay.frontend_port();
        assert!(Relay::bind(&ctx, "127.0.0.1", taken, 0).is_err());
    }
}
