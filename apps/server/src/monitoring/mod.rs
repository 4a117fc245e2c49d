/// Monitoring engine module - owns the per-service polling machinery
///
/// This module is responsible for:
/// - Probing TCP reachability of registered targets
/// - Applying per-client outage windows and grace-time debounce
/// - Pacing probes through the process-wide admission gate
/// - Publishing status records through the shared relay transport
pub mod gates;
pub mod policy;
pub mod prober;
pub mod publisher;
pub mod worker;

pub use gates::{Gates, ProbeGate, PublishGate};
pub use policy::{GraceDebounce, Instruction, OutageWindow, PolicyTable};
pub use prober::TcpProber;
pub use publisher::{PublishError, StatusPublisher};
pub use worker::PollWorker;
