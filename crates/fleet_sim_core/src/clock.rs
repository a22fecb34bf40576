//! Simulation time: whole-second discrete-event timeline.
//!
//! All timestamps and `clock.now()` are in simulation seconds. The timeline
//! advances by popping the next scheduled event off a min-heap. Ties at the
//! same timestamp are broken by insertion order (FIFO), matching the
//! concurrency contract in the specification: "ties broken by insertion
//! order (FIFO at same instant)".

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

/// What kind of process woke up. Matched on directly in `engine::dispatch`,
/// one arm per variant, rather than gating separate systems on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Fired once at t=0 to kick off spawning.
    SimulationStarted,
    /// A vehicle's idle-drain process reaches its next threshold.
    VehicleIdleWake,
    /// A rider process wakes at its scheduled departure time.
    RiderDeparture,
    /// A rider's ride (vehicle in motion) finishes.
    RiderRideComplete,
    /// A rider finishes the fixed parking delay after a ride.
    RiderParkComplete,
    /// A fleet specialist's start_time elapses; registers with the registry.
    SpecialistStart,
    /// A fleet specialist re-checks for available tasks after waiting.
    SpecialistPoll,
    /// A fleet specialist finishes driving to its planned task.
    SpecialistArrived,
    /// A fleet specialist finishes the battery-swap dwell time.
    SpecialistSwapComplete,
    /// A fleet specialist finishes refilling its van at the warehouse.
    SpecialistRefillComplete,
    /// Periodic world snapshot for telemetry.
    SnapshotTick,
}

/// Which entity an event concerns, if any (snapshot ticks have none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSubject(pub Entity);

/// Simulation event. `timestamp` is in simulation seconds.
///
/// `token` disambiguates stale wakeups from live ones: a vehicle's idle
/// process stamps the wake event with its current `idle_token` (see
/// `vehicle::Vehicle`); if the vehicle is interrupted before the wakeup
/// fires, the token on the vehicle is bumped, and the eventual wakeup
/// becomes a silent no-op when it observes a mismatched token. This is
/// the discrete-event substitute for cancelling a suspended coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
    pub token: u64,
    seq: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by timestamp, then by insertion order (FIFO) for ties.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Discrete-event clock: whole-second virtual time, advancing to the next
/// scheduled event. No real-time pacing: a step is "instantaneous" in
/// wall-clock terms, per the specification's "no timeouts on external
/// calls" rule.
#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    events: BinaryHeap<Event>,
    next_seq: u64,
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule an event at an absolute simulation second. `at` must be
    /// `>= now()`; scheduling into the past is a logic error.
    pub fn schedule_at(
        &mut self,
        at: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
        token: u64,
    ) {
        debug_assert!(at >= self.now, "event scheduled before current time");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            timestamp: at,
            kind,
            subject,
            token,
            seq,
        });
    }

    /// Schedule an event `delta` seconds from now.
    pub fn schedule_in(
        &mut self,
        delta: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
        token: u64,
    ) {
        self.schedule_at(self.now.saturating_add(delta), kind, subject, token);
    }

    /// Pop the next event (earliest timestamp, then FIFO). Advances `now`.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_events_in_time_then_fifo_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(20, EventKind::SnapshotTick, None, 0);
        clock.schedule_at(5, EventKind::SnapshotTick, None, 0);
        clock.schedule_at(20, EventKind::SpecialistPoll, None, 0);
        clock.schedule_at(10, EventKind::SnapshotTick, None, 0);

        assert_eq!(clock.pop_next().unwrap().timestamp, 5);
        assert_eq!(clock.now(), 5);
        assert_eq!(clock.pop_next().unwrap().timestamp, 10);

        // Same timestamp (20): first scheduled (SnapshotTick) wins, not kind order.
        let third = clock.pop_next().unwrap();
        assert_eq!(third.timestamp, 20);
        assert_eq!(third.kind, EventKind::SnapshotTick);
        let fourth = clock.pop_next().unwrap();
        assert_eq!(fourth.kind, EventKind::SpecialistPoll);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
    }

    #[test]
    fn schedule_in_is_relative_to_now() {
        let mut clock = SimulationClock::default();
        clock.schedule_in(5, EventKind::SnapshotTick, None, 0);
        let e = clock.pop_next().unwrap();
        assert_eq!(e.timestamp, 5);
        clock.schedule_in(5, EventKind::SnapshotTick, None, 0);
        assert_eq!(clock.next_event_time(), Some(10));
    }

    #[test]
    fn stale_token_is_detectable_by_caller() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(10, EventKind::VehicleIdleWake, None, 1);
        clock.schedule_at(10, EventKind::VehicleIdleWake, None, 2);
        let first = clock.pop_next().unwrap();
        let second = clock.pop_next().unwrap();
        assert_ne!(first.token, second.token);
    }
}
