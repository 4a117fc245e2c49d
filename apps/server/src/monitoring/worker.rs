//! The long-lived polling loop for one (service, client) binding.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vigil_wire::{ClientId, ServiceAddr, Status, StatusRecord};

use super::gates::Gates;
use super::policy::{GraceDebounce, Instruction, PolicyTable};
use super::prober::TcpProber;
use super::publisher::StatusPublisher;

/// Polls one service on behalf of one client and publishes the outcome.
///
/// Every registration spawns a fresh worker, including repeat registrations
/// of the same service; each keeps its own cadence and debounce state while
/// sharing the service's instruction queue, policy table and publisher.
pub struct PollWorker {
    client_id: ClientId,
    service: ServiceAddr,
    poll_interval: Duration,
    instructions: flume::Receiver<Instruction>,
    policy: Arc<RwLock<PolicyTable>>,
    publisher: Arc<StatusPublisher>,
    prober: TcpProber,
    gates: Gates,
    shutdown: CancellationToken,
}

impl PollWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: ClientId,
        service: ServiceAddr,
        poll_interval: Duration,
        connect_timeout: Duration,
        instructions: flume::Receiver<Instruction>,
        policy: Arc<RwLock<PolicyTable>>,
        publisher: Arc<StatusPublisher>,
        gates: Gates,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client_id,
            service,
            poll_interval,
            instructions,
            policy,
            publisher,
            prober: TcpProber::new(connect_timeout),
            gates,
            shutdown,
        }
    }

    /// Run until the publish transport fails or shutdown is signalled.
    pub async fn run(self) {
        info!(
            service = %self.service,
            client = %self.client_id,
            interval_secs = self.poll_interval.as_secs(),
            "polling worker started"
        );

        let mut debounce = GraceDebounce::default();
        let mut last_published: Option<Status> = None;

        loop {
            self.apply_instructions().await;

            let now = Utc::now();
            let (in_outage, grace) = {
                let policy = self.policy.read().await;
                (policy.in_outage(&self.client_id, now), policy.grace(&self.client_id))
            };

            if in_outage {
                debug!(service = %self.service, client = %self.client_id, "outage window active, probe skipped");
            } else {
                let observed = {
                    let _permit = self.gates.probe.admit().await;
                    self.prober.probe(&self.service).await
                };
                let status = debounce.classify(observed, grace);

                let record =
                    StatusRecord::new(self.client_id.clone(), self.service.clone(), status);
                if let Err(err) = self.publisher.publish(&record).await {
                    error!(
                        service = %self.service,
                        client = %self.client_id,
                        error = %err,
                        "publish transport failed, stopping worker"
                    );
                    break;
                }

                if last_published != Some(status) {
                    info!(service = %self.service, client = %self.client_id, status = %status, "status transition");
                    last_published = Some(status);
                }
            }

            // the wait happens regardless of whether this cycle probed
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(service = %self.service, client = %self.client_id, "polling worker stopped");
    }

    /// Drain queued policy updates without blocking. The whole batch is
    /// applied under one write lock so that sibling workers draining the
    /// same queue cannot interleave applications out of enqueue order.
    async fn apply_instructions(&self) {
        if self.instructions.is_empty() {
            return;
        }
        let now = Utc::now();
        let mut policy = self.policy.write().await;
        while let Ok(instruction) = self.instructions.try_recv() {
            policy.apply(instruction, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::policy::OutageWindow;
    use chrono::Duration as ChronoDuration;

    fn test_worker(
        port: u16,
        rx: flume::Receiver<Instruction>,
        policy: Arc<RwLock<PolicyTable>>,
        shutdown: CancellationToken,
    ) -> PollWorker {
        let ctx = zmq::Context::new();
        let gates = Gates::new(Duration::from_millis(0));
        let publisher = Arc::new(
            StatusPublisher::connect(&ctx, "tcp://127.0.0.1:1", gates.publish.clone()).unwrap(),
        );
        PollWorker::new(
            ClientId::from("c1"),
            ServiceAddr::new("127.0.0.1", port),
            Duration::from_millis(50),
            Duration::from_secs(1),
            rx,
            policy,
            publisher,
            gates,
            shutdown,
        )
    }

    #[tokio::test]
    async fn queued_instructions_land_in_the_shared_table() {
        let (tx, rx) = flume::unbounded();
        let policy = Arc::new(RwLock::new(PolicyTable::default()));
        let shutdown = CancellationToken::new();
        let worker = test_worker(1, rx, policy.clone(), shutdown.clone());

        let start = Utc::now() - ChronoDuration::minutes(1);
        let end = Utc::now() + ChronoDuration::minutes(1);
        tx.send(Instruction::Outage {
            client_id: ClientId::from("c1"),
            window: OutageWindow { start, end },
        })
        .unwrap();
        tx.send(Instruction::Grace { client_id: ClientId::from("c1"), seconds: 30 }).unwrap();

        worker.apply_instructions().await;

        let table = policy.read().await;
        assert!(table.in_outage(&ClientId::from("c1"), Utc::now()));
        assert_eq!(table.grace(&ClientId::from("c1")), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn worker_exits_on_shutdown() {
        let (_tx, rx) = flume::unbounded();
        let policy = Arc::new(RwLock::new(PolicyTable::default()));
        let shutdown = CancellationToken::new();
        let worker = test_worker(9, rx, policy, shutdown.clone());

        let handle = tokio::spawn(worker.run());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
