//! Per-client reporting policy: outage windows and grace-time debounce.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use vigil_wire::{ClientId, Status};

/// A maintenance interval during which unreachability is not reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OutageWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }
}

/// A policy update handed from the control plane to a service's workers.
///
/// Tagged variants keep the two shapes unambiguous no matter how the
/// payloads evolve.
#[derive(Debug, Clone)]
pub enum Instruction {
    Outage { client_id: ClientId, window: OutageWindow },
    Grace { client_id: ClientId, seconds: i64 },
}

/// Per-service policy state, shared by all workers polling that service
/// and keyed by the client each entry belongs to.
#[derive(Debug, Default)]
pub struct PolicyTable {
    outages: HashMap<ClientId, Vec<OutageWindow>>,
    grace: HashMap<ClientId, i64>,
}

impl PolicyTable {
    /// Apply one queued instruction. Expired windows for the touched client
    /// are pruned on the way in, so the window list stays bounded.
    pub fn apply(&mut self, instruction: Instruction, now: DateTime<Utc>) {
        match instruction {
            Instruction::Outage { client_id, window } => {
                let windows = self.outages.entry(client_id).or_default();
                windows.retain(|existing| !existing.expired(now));
                windows.push(window);
            }
            Instruction::Grace { client_id, seconds } => {
                self.grace.insert(client_id, seconds);
            }
        }
    }

    /// Whether `now` falls inside any window registered for this client.
    /// Windows belonging to other clients never suppress this one.
    pub fn in_outage(&self, client_id: &ClientId, now: DateTime<Utc>) -> bool {
        self.outages
            .get(client_id)
            .is_some_and(|windows| windows.iter().any(|window| window.contains(now)))
    }

    /// The client's effective debounce duration; `None` when debounce is
    /// disabled (unset, zero or negative).
    pub fn grace(&self, client_id: &ClientId) -> Option<Duration> {
        self.grace
            .get(client_id)
            .copied()
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Duration::from_secs(seconds as u64))
    }
}

/// Worker-local debounce over raw probe verdicts.
///
/// A flip to DOWN is reported as UP until the target has stayed down for
/// the grace duration; UP always reports immediately. A target that was
/// never seen up reports DOWN at once, since there is no flip to suppress.
#[derive(Debug, Default)]
pub struct GraceDebounce {
    down_since: Option<Instant>,
    seen_up: bool,
}

impl GraceDebounce {
    /// Fold one probe verdict into the debounce and return what to publish.
    pub fn classify(&mut self, observed: Status, grace: Option<Duration>) -> Status {
        match observed {
            Status::Up => {
                self.down_since = None;
                self.seen_up = true;
                Status::Up
            }
            Status::Down => {
                // stamp continuity even while debounce is off, so a grace
                // set mid-outage measures from the first DOWN observation
                let since = *self.down_since.get_or_insert_with(Instant::now);
                let Some(grace) = grace else { return Status::Down };
                if !self.seen_up || since.elapsed() >= grace {
                    Status::Down
                } else {
                    Status::Up
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> OutageWindow {
        OutageWindow { start, end }
    }

    #[test]
    fn windows_are_evaluated_disjunctively() {
        let client = ClientId::from("c1");
        let mut table = PolicyTable::default();
        let now = at(12, 0);
        table.apply(
            Instruction::Outage { client_id: client.clone(), window: window(at(1, 0), at(2, 0)) },
            now,
        );
        table.apply(
            Instruction::Outage { client_id: client.clone(), window: window(at(11, 0), at(13, 0)) },
            now,
        );

        assert!(table.in_outage(&client, at(12, 30)));
        assert!(!table.in_outage(&client, at(14, 0)));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let client = ClientId::from("c1");
        let mut table = PolicyTable::default();
        table.apply(
            Instruction::Outage { client_id: client.clone(), window: window(at(11, 0), at(13, 0)) },
            at(10, 0),
        );

        assert!(table.in_outage(&client, at(11, 0)));
        assert!(table.in_outage(&client, at(13, 0)));
        assert!(!table.in_outage(&client, at(13, 1)));
    }

    #[test]
    fn outage_for_one_client_does_not_suppress_siblings() {
        let c1 = ClientId::from("c1");
        let c2 = ClientId::from("c2");
        let mut table = PolicyTable::default();
        table.apply(
            Instruction::Outage { client_id: c1.clone(), window: window(at(11, 0), at(13, 0)) },
            at(10, 0),
        );

        assert!(table.in_outage(&c1, at(12, 0)));
        assert!(!table.in_outage(&c2, at(12, 0)));
    }

    #[test]
    fn expired_windows_are_pruned_on_apply() {
        let client = ClientId::from("c1");
        let mut table = PolicyTable::default();
        table.apply(
            Instruction::Outage { client_id: client.clone(), window: window(at(1, 0), at(2, 0)) },
            at(0, 0),
        );
        // applying a later window after the first expired drops the stale one
        table.apply(
            Instruction::Outage { client_id: client.clone(), window: window(at(20, 0), at(21, 0)) },
            at(10, 0),
        );

        assert_eq!(table.outages[&client].len(), 1);
        assert_eq!(table.outages[&client][0].start, at(20, 0));
    }

    #[test]
    fn grace_is_last_write_wins() {
        let client = ClientId::from("c1");
        let mut table = PolicyTable::default();
        table.apply(Instruction::Grace { client_id: client.clone(), seconds: 30 }, at(0, 0));
        table.apply(Instruction::Grace { client_id: client.clone(), seconds: 30 }, at(0, 1));
        assert_eq!(table.grace(&client), Some(Duration::from_secs(30)));

        table.apply(Instruction::Grace { client_id: client.clone(), seconds: 5 }, at(0, 2));
        assert_eq!(table.grace(&client), Some(Duration::from_secs(5)));
    }

    #[test]
    fn negative_grace_disables_debounce() {
        let client = ClientId::from("c1");
        let mut table = PolicyTable::default();
        table.apply(Instruction::Grace { client_id: client.clone(), seconds: -1 }, at(0, 0));
        assert_eq!(table.grace(&client), None);
    }

    #[tokio::test(start_paused = true)]
    async fn down_flip_is_held_up_until_grace_elapses() {
        let mut debounce = GraceDebounce::default();
        let grace = Some(Duration::from_secs(10));

        assert_eq!(debounce.classify(Status::Up, grace), Status::Up);
        assert_eq!(debounce.classify(Status::Down, grace), Status::Up);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(debounce.classify(Status::Down, grace), Status::Up);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(debounce.classify(Status::Down, grace), Status::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_resets_the_debounce_clock() {
        let mut debounce = GraceDebounce::default();
        let grace = Some(Duration::from_secs(10));

        debounce.classify(Status::Up, grace);
        debounce.classify(Status::Down, grace);
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(debounce.classify(Status::Up, grace), Status::Up);

        // the earlier down stretch must not count toward the new one
        assert_eq!(debounce.classify(Status::Down, grace), Status::Up);
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(debounce.classify(Status::Down, grace), Status::Up);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(debounce.classify(Status::Down, grace), Status::Down);
    }

    #[tokio::test]
    async fn disabled_grace_reports_down_immediately() {
        let mut debounce = GraceDebounce::default();
        debounce.classify(Status::Up, None);
        assert_eq!(debounce.classify(Status::Down, None), Status::Down);
    }

    #[tokio::test]
    async fn never_up_target_reports_down_without_delay() {
        let mut debounce = GraceDebounce::default();
        let grace = Some(Duration::from_secs(60));
        assert_eq!(debounce.classify(Status::Down, grace), Status::Down);
    }
}
