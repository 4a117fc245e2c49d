//! Process-wide coordination gates shared by every polling worker.
//!
//! Both are constructed once at startup and handed to each worker, so
//! independent server instances (tests run several) never contend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Admission gate capping total outbound probe pressure.
///
/// At most one probe attempt is in flight at a time, and consecutive
/// attempts by *any* worker are spaced at least `min_interval` apart.
pub struct ProbeGate {
    min_interval: Duration,
    last_probe: Mutex<Option<Instant>>,
}

/// Held for the duration of one probe attempt.
pub struct ProbePermit<'a> {
    _slot: MutexGuard<'a, Option<Instant>>,
}

impl ProbeGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_probe: Mutex::new(None) }
    }

    /// Wait until the minimum spacing since the last probe has elapsed,
    /// stamp the gate and return the permit. The caller probes while
    /// holding it.
    pub async fn admit(&self) -> ProbePermit<'_> {
        let mut last = self.last_probe.lock().await;
        if let Some(previous) = *last {
            let since = previous.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());
        ProbePermit { _slot: last }
    }
}

/// Serializes multipart sends so records from different workers are never
/// interleaved mid-message on the shared transport.
#[derive(Default)]
pub struct PublishGate {
    order: Mutex<()>,
}

impl PublishGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.order.lock().await
    }
}

/// The pair of gates a worker participates in, cloned per worker.
#[derive(Clone)]
pub struct Gates {
    pub probe: Arc<ProbeGate>,
    pub publish: Arc<PublishGate>,
}

impl Gates {
    pub fn new(min_probe_interval: Duration) -> Self {
        Self {
            probe: Arc::new(ProbeGate::new(min_probe_interval)),
            publish: Arc::new(PublishGate::new()),
        }
    }
}
