
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use uuid::Uuid;
use vigil_wire::{ClientId, Reply, Request, ServiceAddr};

use crate::config::Config;
use crate::monitoring::policy::OutageWindow;
use crate::monitoring::{Gates, Instruction, PolicyTable, PollWorker, StatusPublisher};
use crate::relay::tcp_endpoint;

/// How long a receive blocks before the loop re-checks the shutdown token.
const RECV_POLL_MS: i32 = 250;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("control socket setup failed: {0}")]
    Bind(zmq::Error),
    #[error("control channel lost: {0}")]
    Transport(#[from] zmq::Error),
    #[error("reply encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("control endpoint is unparseable")]
    Endpoint,
}

/// Shared polling state for one monitored service; created at most once,
/// lazily, on the first registration by any client.
struct ServiceContext {
    instructions: flume::Sender<Instruction>,
    /// Workers of this service compete to drain the same queue; whoever
    /// drains an instruction applies it to the shared policy table.
    instruction_feed: flume::Receiver<Instruction>,
    policy: Arc<RwLock<PolicyTable>>,
    publisher: Arc<StatusPublisher>,
}

/// Strict request/reply server owning the registries.
pub struct Dispatcher {
    socket: zmq::Socket,
    ctx: zmq::Context,
    relay_frontend: String,
    connect_timeout: Duration,
    clients: HashMap<ClientId, Vec<ServiceAddr>>,
    services: HashMap<ServiceAddr, ServiceContext>,
    gates: Gates,
    runtime: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Bind the control endpoint. Failure is fatal to server startup.
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        ctx: zmq::Context,
        config: &Config,
        relay_frontend: String,
        gates: Gates,
        runtime: Handle,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Result<Self, DispatchError> {
        let socket = ctx.socket(zmq::REP).map_err(DispatchError::Bind)?;
        socket.set_rcvtimeo(RECV_POLL_MS).map_err(DispatchError::Bind)?;
        socket
            .bind(&tcp_endpoint(&config.control.bind, config.control.port))
            .map_err(DispatchError::Bind)?;

        Ok(Self {
            socket,
            ctx,
            relay_frontend,
            connect_timeout: Duration::from_secs(config.probe.connect_timeout_secs),
            clients: HashMap::new(),
            services: HashMap::new(),
            gates,
            runtime,
            tracker,
            shutdown,
        })
    }

    /// The endpoint the control socket actually bound, wildcards resolved.
    pub fn control_endpoint(&self) -> Result<String, DispatchError> {
        self.socket
            .get_last_endpoint()
            .map_err(DispatchError::Transport)?
            .map_err(|_| DispatchError::Endpoint)
    }

    /// Receive one request, send one reply, repeat until shutdown or
    /// transport loss. Runs on a dedicated blocking thread.
    pub fn run(mut self) -> Result<(), DispatchError> {
        info!("control plane serving");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let raw = match self.socket.recv_bytes(0) {
                Ok(raw) => raw,
                Err(zmq::Error::EAGAIN) => continue,
                Err(err) => {
                    error!(error = %err, "control channel receive failed");
                    self.shutdown.cancel();
                    return Err(err.into());
                }
            };

            let reply = match serde_json::from_slice::<Request>(&raw) {
                Ok(request) => self.handle(request),
                Err(err) => {
                    error!(error = %err, "received invalid command");
                    Reply::InvalidHeader
                }
            };

            if let Err(err) = self.socket.send(serde_json::to_vec(&reply)?, 0) {
                error!(error = %err, "control channel send failed");
                self.shutdown.cancel();
                return Err(err.into());
            }
        }

        info!("control plane stopped");
        Ok(())
    }

    /// Map one typed request to its reply, mutating registries as needed.
    fn handle(&mut self, request: Request) -> Reply {
        match request {
            Request::RegisterClient => self.register_client(),
            Request::RegisterService { service_host, service_port, poll_freq, client_id } => {
                self.register_service(service_host, service_port, poll_freq, client_id)
            }
            Request::SetOutageTime {
                service_host,
                service_port,
                start_time,
                end_time,
                client_id,
            } => self.set_outage_time(
                ServiceAddr::new(service_host, service_port),
                OutageWindow { start: start_time, end: end_time },
                client_id,
            ),
            Request::SetGraceTime { grace_time, client_id } => {
                self.set_grace_time(grace_time, client_id)
            }
        }
    }

    /// Mint a collision-resistant id and an empty service list. Never fails.
    fn register_client(&mut self) -> Reply {
        let client_id = ClientId::from(Uuid::new_v4().to_string());
        self.clients.insert(client_id.clone(), Vec::new());

        info!(client = %client_id, "registered a new client");
        Reply::registered(client_id)
    }

    /// Create the service's polling context on first sight, then spawn a
    /// worker for this (service, client, poll_freq) binding. Repeat
    /// registrations spawn additional independent workers on purpose:
    /// policy state is per (service, client), so each client keeps its own
    /// cadence at the cost of duplicate probing.
    fn register_service(
        &mut self,
        service_host: String,
        service_port: u16,
        poll_freq: u64,
        client_id: ClientId,
    ) -> Reply {
        if !self.clients.contains_key(&client_id) {
            return Reply::failure(format!("client {client_id} is not registered"));
        }
        if poll_freq == 0 {
            return Reply::failure("poll_freq must be at least 1 second");
        }

        let service = ServiceAddr::new(service_host, service_port);
        if !self.services.contains_key(&service) {
            let publisher = match StatusPublisher::connect(
                &self.ctx,
                &self.relay_frontend,
                self.gates.publish.clone(),
            ) {
                Ok(publisher) => Arc::new(publisher),
                Err(err) => {
                    error!(service = %service, error = %err, "failed to establish publishing transport");
                    return Reply::failure(err.to_string());
                }
            };
            let (instructions, instruction_feed) = flume::unbounded();
            self.services.insert(
                service.clone(),
                ServiceContext {
                    instructions,
                    instruction_feed,
                    policy: Arc::new(RwLock::new(PolicyTable::default())),
                    publisher,
                },
            );
        }

        let context = &self.services[&service];
        let worker = PollWorker::new(
            client_id.clone(),
            service.clone(),
            Duration::from_secs(poll_freq),
            self.connect_timeout,
            context.instruction_feed.clone(),
            context.policy.clone(),
            context.publisher.clone(),
            self.gates.clone(),
            self.shutdown.clone(),
        );
        let _ = self.tracker.spawn_on(worker.run(), &self.runtime);

        if let Some(services) = self.clients.get_mut(&client_id) {
            services.push(service.clone());
        }

        info!(service = %service, client = %client_id, "start to monitor service");
        Reply::success()
    }

    /// Queue an outage window toward the service's workers. Applied at the
    /// top of a worker cycle, not synchronously here.
    fn set_outage_time(
        &mut self,
        service: ServiceAddr,
        window: OutageWindow,
        client_id: ClientId,
    ) -> Reply {
        let Some(context) = self.services.get(&service) else {
            let err = format!("service {service} is not monitored");
            error!(client = %client_id, "{err}");
            return Reply::failure(err);
        };

        if context.instructions.send(Instruction::Outage { client_id: client_id.clone(), window }).is_err() {
            return Reply::failure("service instruction queue is closed");
        }

        info!(service = %service, client = %client_id, "set outage time");
        Reply::success()
    }

    /// Queue a grace-time update toward every service the client monitors.
    fn set_grace_time(&mut self, grace_time: i64, client_id: ClientId) -> Reply {
        let Some(services) = self.clients.get(&client_id) else {
            return Reply::failure(format!("client {client_id} is not registered"));
        };

        for service in services {
            let Some(context) = self.services.get(service) else { continue };
            if context
                .instructions
                .send(Instruction::Grace { client_id: client_id.clone(), seconds: grace_time })
                .is_err()
            {
                return Reply::failure("service instruction queue is closed");
            }
        }

        info!(client = %client_id, grace_time, "set grace time for client services");
        Reply::success()
    }
}
