//! Request/reply wrapper around the server's control channel.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;
use vigil_wire::{ClientId, Reply, Request};

/// How long to wait for a reply before declaring the control channel lost.
const REPLY_TIMEOUT_MS: i32 = 10_000;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The control channel is gone; the session cannot continue.
    #[error("control channel: {0}")]
    Transport(#[from] zmq::Error),
    #[error("terminal: {0}")]
    Io(#[from] std::io::Error),
    #[error("message encoding: {0}")]
    Encode(#[from] serde_json::Error),
    /// The server answered, but declined the request. Recoverable; the
    /// session continues.
    #[error("server refused: {0}")]
    Refused(String),
    #[error("could not register client")]
    RegistrationRejected,
    #[error("unexpected reply from server")]
    UnexpectedReply,
}

impl ClientError {
    /// Whether the prompt session can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::Refused(_))
    }
}

/// A registered control-channel session.
///
/// Construction performs the REGISTER_CLIENT handshake, so every value of
/// this type owns a server-minted id.
pub struct MonitorClient {
    socket: zmq::Socket,
    id: ClientId,
}

impl std::fmt::Debug for MonitorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorClient").field("id", &self.id).finish_non_exhaustive()
    }
}

impl MonitorClient {
    /// Connect to the control endpoint and register this client.
    pub fn connect(ctx: &zmq::Context, host: &str, port: u16) -> Result<Self, ClientError> {
        let socket = ctx.socket(zmq::REQ)?;
        socket.set_rcvtimeo(REPLY_TIMEOUT_MS)?;
        socket.connect(&format!("tcp://{host}:{port}"))?;

        match exchange(&socket, &Request::RegisterClient)? {
            Reply::Success { client_id: Some(id) } => Ok(Self { socket, id }),
            _ => Err(ClientError::RegistrationRejected),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Ask the server to start monitoring a service for this client.
    pub fn register_service(
        &self,
        service_host: &str,
        service_port: u16,
        poll_freq: u64,
    ) -> Result<(), ClientError> {
        let request = Request::RegisterService {
            service_host: service_host.to_owned(),
            service_port,
            poll_freq,
            client_id: self.id.clone(),
        };
        expect_success(exchange(&self.socket, &request)?)
    }

    /// Declare a maintenance window for one of this client's services.
    pub fn set_outage_time(
        &self,
        service_host: &str,
        service_port: u16,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let request = Request::SetOutageTime {
            service_host: service_host.to_owned(),
            service_port,
            start_time,
            end_time,
            client_id: self.id.clone(),
        };
        expect_success(exchange(&self.socket, &request)?)
    }

    /// Set the DOWN debounce for every service this client monitors.
    /// Negative values cancel it.
    pub fn set_grace_time(&self, grace_time: i64) -> Result<(), ClientError> {
        let request = Request::SetGraceTime { grace_time, client_id: self.id.clone() };
        expect_success(exchange(&self.socket, &request)?)
    }
}

/// One strict request/reply turn.
fn exchange(socket: &zmq::Socket, request: &Request) -> Result<Reply, ClientError> {
    socket.send(serde_json::to_vec(request)?, 0)?;
    let raw = socket.recv_bytes(0)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn expect_success(reply: Reply) -> Result<(), ClientError> {
    match reply {
        Reply::Success { .. } => Ok(()),
        Reply::Failure { err } => {
            error!(error = %err, "request refused by server");
            Err(ClientError::Refused(err))
        }
        Reply::InvalidHeader => Err(ClientError::UnexpectedReply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal scripted control plane: answers a fixed reply per request.
    fn scripted_server(ctx: &zmq::Context, replies: Vec<Reply>) -> (String, std::thread::JoinHandle<Vec<Request>>) {
        let socket = ctx.socket(zmq::REP).unwrap();
        socket.bind("tcp://127.0.0.1:*").unwrap();
        let endpoint = socket.get_last_endpoint().unwrap().unwrap();

        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for reply in replies {
                let raw = socket.recv_bytes(0).unwrap();
                seen.push(serde_json::from_slice(&raw).unwrap());
                socket.send(serde_json::to_vec(&reply).unwrap(), 0).unwrap();
            }
            seen
        });
        (endpoint, handle)
    }

    fn port_of(endpoint: &str) -> u16 {
        endpoint.rsplit(':').next().unwrap().parse().unwrap()
    }

    #[test]
    fn connect_registers_and_stores_the_minted_id() {
        let ctx = zmq::Context::new();
        let (endpoint, server) =
            scripted_server(&ctx, vec![Reply::registered(ClientId::from("c-77"))]);

        let client = MonitorClient::connect(&ctx, "127.0.0.1", port_of(&endpoint)).unwrap();
        assert_eq!(client.id(), &ClientId::from("c-77"));

        let seen = server.join().unwrap();
        assert_eq!(seen, vec![Request::RegisterClient]);
    }

    #[test]
    fn refusal_is_surfaced_with_the_reason() {
        let ctx = zmq::Context::new();
        let (endpoint, server) = scripted_server(
            &ctx,
            vec![
                Reply::registered(ClientId::from("c-1")),
                Reply::failure("service 10.0.0.9:80 is not monitored"),
            ],
        );

        let client = MonitorClient::connect(&ctx, "127.0.0.1", port_of(&endpoint)).unwrap();
        let err = client
            .set_outage_time("10.0.0.9", 80, Utc::now(), Utc::now())
            .unwrap_err();

        assert!(err.is_recoverable());
        assert!(matches!(err, ClientError::Refused(reason) if reason.contains("not monitored")));
        server.join().unwrap();
    }

    #[test]
    fn registration_rejection_fails_the_connect() {
        let ctx = zmq::Context::new();
        let (endpoint, server) = scripted_server(&ctx, vec![Reply::failure("nope")]);

        let err = MonitorClient::connect(&ctx, "127.0.0.1", port_of(&endpoint)).unwrap_err();
        assert!(matches!(err, ClientError::RegistrationRejected));
        server.join().unwrap();
    }
}
