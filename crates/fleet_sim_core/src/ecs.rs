//! Entity-component definitions for parking spots, vehicles, tasks, riders
//! and fleet specialists.
//!
//! Entities are the stable integer-style ids the specification's design
//! notes ask for (`bevy_ecs::Entity` is an index+generation arena slot);
//! components hold per-entity state; cross-entity links (vehicle's parking
//! spot, task's vehicle, rider's vehicle) are plain `Entity` fields resolved
//! back through the `World`, which avoids the ownership cycles the
//! specification calls out (Vehicle<->ParkingSpot<->Vehicle,
//! Vehicle<->Task<->Vehicle).

use bevy_ecs::prelude::{Component, Entity};

use crate::battery::Battery;
use crate::map::Location;

/// A fixed geographic point where vehicles may be parked and picked up.
#[derive(Debug, Component)]
pub struct ParkingSpot {
    pub location: Location,
    /// Ordered roster of vehicles currently parked here; a vehicle appears
    /// in at most one spot's roster at any instant (specification
    /// invariant).
    pub roster: Vec<Entity>,
    /// Symmetric, self-excluding neighbor set within `WALK_RADIUS`.
    pub neighbors: Vec<Entity>,
    pub capacity: Option<usize>,
}

impl ParkingSpot {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            roster: Vec::new(),
            neighbors: Vec::new(),
            capacity: None,
        }
    }

    pub fn has_room(&self) -> bool {
        self.capacity.map_or(true, |cap| self.roster.len() < cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Ready,
    Riding,
    Bounty,
}

/// Idle-drain state machine plus lifecycle state.
#[derive(Debug, Component)]
pub struct Vehicle {
    pub battery: Battery,
    pub parking_spot: Entity,
    pub task: Option<Entity>,
    pub status: VehicleStatus,
    /// `available = task.is_none() || !task.bounty` (specification §4.3).
    pub available: bool,
    /// Simulation time the current idle suspension began; `None` while not
    /// idling (riding, or swap in progress).
    pub idle_start: Option<u64>,
    /// Bumped on every `interrupt_idle` / `resume_idle`; a wake event whose
    /// carried token doesn't match this value is stale and ignored.
    pub idle_token: u64,
}

impl Vehicle {
    pub fn new(parking_spot: Entity, battery: Battery) -> Self {
        Self {
            battery,
            parking_spot,
            task: None,
            status: VehicleStatus::Ready,
            available: true,
            idle_start: None,
            idle_token: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Active,
    Pending,
    Resolved,
}

impl TaskStatus {
    /// The result-row spelling (specification §6 `task rows`' `status` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Pending => "pending",
            TaskStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    BatterySwap,
}

impl TaskKind {
    /// The result-row spelling (specification §6 `task rows`' `task_type` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::BatterySwap => "battery_swap",
        }
    }
}

/// A maintenance work item. Location is *not* stored: it is always read
/// through `vehicle.parking_spot.location` at the point of use, per the
/// specification's "dynamic location of Task" design note. Callers must not
/// cache a task's location across a suspension point (i.e. across an
/// `await`/event boundary in this engine).
#[derive(Debug, Component)]
pub struct Task {
    pub kind: TaskKind,
    pub vehicle: Entity,
    pub created_time: u64,
    pub resolved_time: Option<u64>,
    pub resolved_by: Option<Entity>,
    pub status: TaskStatus,
    pub bounty: bool,
    pub bounty_time: Option<u64>,
    /// Battery level recorded when the task was created (going-flat level).
    pub battery_in: f64,
    /// Battery level observed at swap time, just before the refill lands.
    /// Named `battery_incoming_at_swap` rather than `battery_out` (the
    /// original's name was backwards: see specification §9 open question)
    /// to make clear this is the level the vehicle arrived with, not the
    /// level it leaves with (which is always full capacity).
    pub battery_incoming_at_swap: Option<f64>,
    /// Reserved for future prioritization; never populated in this engine
    /// (kept because the Results contract has a `priority` column).
    pub priority: Option<u32>,
    pub target_time: Option<u64>,
}

impl Task {
    pub fn new(vehicle: Entity, created_time: u64, battery_in: f64) -> Self {
        Self {
            kind: TaskKind::BatterySwap,
            vehicle,
            created_time,
            resolved_time: None,
            resolved_by: None,
            status: TaskStatus::Active,
            bounty: false,
            bounty_time: None,
            battery_in,
            battery_incoming_at_swap: None,
            priority: None,
            target_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderStatus {
    Unfulfilled,
    Completed,
}

impl RiderStatus {
    /// The result-row spelling (specification §6 `ride rows`' `status`
    /// column: `unfullfilled`/`completed`, the original's spelling kept
    /// verbatim since it's the external contract, not a typo to fix here).
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Unfulfilled => "unfullfilled",
            RiderStatus::Completed => "completed",
        }
    }
}

/// A one-shot trip request: pickup with neighbor fallback, ride, park.
#[derive(Debug, Component)]
pub struct Rider {
    pub origin: Entity,
    pub destination: Entity,
    pub departure_time: u64,
    pub target_time: Option<u64>,
    pub override_distance: Option<f64>,
    pub vehicle: Option<Entity>,
    pub status: RiderStatus,
    pub ride_started_at: Option<u64>,
    pub ride_distance: Option<f64>,
    pub battery_in: Option<f64>,
    pub battery_out: Option<f64>,
}

impl Rider {
    pub fn new(
        origin: Entity,
        destination: Entity,
        departure_time: u64,
        target_time: Option<u64>,
        override_distance: Option<f64>,
    ) -> Self {
        Self {
            origin,
            destination,
            departure_time,
            target_time,
            override_distance,
            vehicle: None,
            status: RiderStatus::Unfulfilled,
            ride_started_at: None,
            ride_distance: None,
            battery_in: None,
            battery_out: None,
        }
    }
}

/// A field worker driving around resolving battery-swap tasks.
#[derive(Debug, Component)]
pub struct FleetSpecialist {
    pub location: Location,
    pub start_time: u64,
    pub van_battery_stock: u32,
    pub van_capacity: u32,
    pub focus_polygon: Option<crate::map::Polygon>,
    /// When true, nearest-task planning uses drive distance instead of
    /// Euclidean geographic distance (specification §4.5 step 2.3).
    pub optimize: bool,
    pub planned_tasks: Vec<Entity>,
    pub next_task: Option<Entity>,
    /// The task's parking-spot location at the moment the specialist
    /// committed to driving there (`FleetSpecialist.py:141` checks
    /// `self.next_task.location == self.location` on arrival to catch a
    /// vehicle that was ridden elsewhere while the specialist was en route).
    pub task_destination: Option<Location>,
    pub task_start_time: u64,
    pub task_distance_driven: f64,
}

impl FleetSpecialist {
    pub fn new(location: Location, start_time: u64, van_capacity: u32) -> Self {
        Self {
            location,
            start_time,
            van_battery_stock: van_capacity,
            van_capacity,
            focus_polygon: None,
            optimize: false,
            planned_tasks: Vec::new(),
            next_task: None,
            task_destination: None,
            task_start_time: 0,
            task_distance_driven: 0.0,
        }
    }
}
