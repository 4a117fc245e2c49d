//! Background subscriber for pushed status records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use vigil_wire::{ClientId, StatusRecord};

use crate::client::ClientError;

/// Receive timeout; also how often the loop notices the terminate flag.
const RECV_TIMEOUT_MS: i32 = 5_000;

/// SUB loop filtered to this client's own topic.
pub struct Subscriber {
    socket: zmq::Socket,
    terminate: Arc<AtomicBool>,
}

impl Subscriber {
    /// Connect to the relay backend, subscribed to `topic` only.
    pub fn connect(
        ctx: &zmq::Context,
        host: &str,
        port: u16,
        topic: &ClientId,
    ) -> Result<Self, ClientError> {
        let socket = ctx.socket(zmq::SUB)?;
        socket.set_rcvtimeo(RECV_TIMEOUT_MS)?;
        socket.set_subscribe(topic.as_bytes())?;
        socket.connect(&format!("tcp://{host}:{port}"))?;

        Ok(Self { socket, terminate: Arc::new(AtomicBool::new(false)) })
    }

    /// Flag the run loop to exit at its next receive timeout.
    pub fn terminate_handle(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    /// Decode and report pushed records until terminated. Runs on its own
    /// thread; the socket closes when this returns.
    pub fn run(self) {
        loop {
            match self.socket.recv_multipart(0) {
                Ok(frames) => match StatusRecord::from_frames(&frames) {
                    Ok(record) => {
                        info!(service = %record.service, status = %record.status, "status update");
                        println!("[{}] {} is {}", record.client_id, record.service, record.status);
                    }
                    Err(err) => warn!(error = %err, "discarding undecodable record"),
                },
                Err(zmq::Error::EAGAIN) => {
                    if self.terminate.load(Ordering::Relaxed) {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "subscription lost");
                    break;
                }
            }
        }
    }
}
