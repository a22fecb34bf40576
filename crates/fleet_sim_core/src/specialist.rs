//! Fleet-specialist process (specification §4.5): a long-running loop that
//! polls for available tasks, drives to the nearest one (optionally
//! focus-area-filtered), resolves it, and refills its van when it runs out
//! of batteries.
//!
//! Grounded on `FleetSpecialist.py`'s `work_flow`/`plan_next_task`/
//! `drive_to`/`resolve_task`/`refill_batteries`, split across
//! `EventKind::Specialist*` handlers the way this engine splits every
//! suspendable coroutine.

use bevy_ecs::prelude::{Entity, World};

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::data_interface;
use crate::ecs::{FleetSpecialist, Task, TaskStatus, Vehicle, VehicleStatus};
use crate::map::Map;
use crate::task_registry::{self, TaskRegistry};
use crate::vehicle::{self, MaintenanceThresholds};

/// Wait between polls when no task is currently available
/// (`FleetSpecialist.py::work_flow`'s `env.timeout(30)`).
pub const POLL_INTERVAL_SECONDS: u64 = 30;

pub struct SpecialistTiming {
    pub driving_speed_m_per_s: f64,
    pub time_per_swap_single_s: u64,
    pub time_per_swap_multiple_s: u64,
    pub refill_van_batteries_time_s: u64,
}

/// Schedules a specialist's `SpecialistStart` event at its configured start
/// time. Call once per spawned specialist.
pub fn schedule_start(clock: &mut SimulationClock, specialist_entity: Entity, start_time: u64) {
    clock.schedule_at(
        start_time,
        EventKind::SpecialistStart,
        Some(EventSubject(specialist_entity)),
        0,
    );
}

/// Handles `SpecialistStart`: registers the specialist and immediately polls.
pub fn handle_start(
    world: &mut World,
    clock: &mut SimulationClock,
    registry: &mut TaskRegistry,
    specialist_entity: Entity,
) {
    registry.add_specialist(specialist_entity);
    poll_now(clock, specialist_entity);
}

fn poll_now(clock: &mut SimulationClock, specialist_entity: Entity) {
    clock.schedule_at(
        clock.now(),
        EventKind::SpecialistPoll,
        Some(EventSubject(specialist_entity)),
        0,
    );
}

/// Nearest-task lookup, either by Euclidean (great-circle) distance from the
/// specialist's current location, or by drive distance when `optimize` is
/// set (`find_nearest_task` / `find_nearest_task_drive`).
fn find_nearest_task(
    world: &World,
    map: &dyn Map,
    specialist: &FleetSpecialist,
    candidates: &[Entity],
) -> Option<Entity> {
    candidates
        .iter()
        .copied()
        .min_by(|&a, &b| {
            let dist = |task_entity: Entity| -> f64 {
                let task = world.get::<Task>(task_entity).unwrap();
                let vehicle = world.get::<Vehicle>(task.vehicle).unwrap();
                let spot = world.get::<crate::ecs::ParkingSpot>(vehicle.parking_spot).unwrap();
                if specialist.optimize {
                    map.drive_distance(specialist.location, spot.location)
                } else {
                    crate::map::haversine_distance_m(specialist.location, spot.location)
                }
            };
            dist(a)
                .partial_cmp(&dist(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Handles `SpecialistPoll`: if the van is out of batteries, goes to refill
/// instead of looking for work. Otherwise checks for available tasks (none
/// -> wait and re-poll); when one is planned, drives to it.
pub fn handle_poll(
    world: &mut World,
    clock: &mut SimulationClock,
    registry: &mut TaskRegistry,
    map: &dyn Map,
    timing: &SpecialistTiming,
    specialist_entity: Entity,
) {
    if world
        .get::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .van_battery_stock
        == 0
    {
        clock.schedule_in(
            timing.refill_van_batteries_time_s,
            EventKind::SpecialistRefillComplete,
            Some(EventSubject(specialist_entity)),
            0,
        );
        return;
    }

    let available = task_registry::available_tasks(world, registry);
    if available.is_empty() {
        clock.schedule_in(
            POLL_INTERVAL_SECONDS,
            EventKind::SpecialistPoll,
            Some(EventSubject(specialist_entity)),
            0,
        );
        return;
    }

    {
        let specialist = world.get::<FleetSpecialist>(specialist_entity).unwrap();

        // Focus-area filter: fall back to the unfiltered set if it's empty
        // (`FleetSpecialist.py::plan_next_task`: "if there are none in focus
        // area, go outside").
        let filtered: Vec<Entity> = match &specialist.focus_polygon {
            Some(polygon) => available
                .iter()
                .copied()
                .filter(|&task_entity| {
                    let task = world.get::<Task>(task_entity).unwrap();
                    let vehicle = world.get::<Vehicle>(task.vehicle).unwrap();
                    let spot = world.get::<crate::ecs::ParkingSpot>(vehicle.parking_spot).unwrap();
                    map.contains(polygon, spot.location)
                })
                .collect(),
            None => available.clone(),
        };
        let candidates = if filtered.is_empty() { &available } else { &filtered };

        if specialist.planned_tasks.is_empty() {
            if let Some(nearest) = find_nearest_task(world, map, specialist, candidates) {
                world
                    .get_mut::<FleetSpecialist>(specialist_entity)
                    .unwrap()
                    .planned_tasks
                    .push(nearest);
            }
        }
    }

    let next_task = world
        .get_mut::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .planned_tasks
        .pop();
    let Some(task_entity) = next_task else {
        clock.schedule_in(
            POLL_INTERVAL_SECONDS,
            EventKind::SpecialistPoll,
            Some(EventSubject(specialist_entity)),
            0,
        );
        return;
    };

    let now = clock.now();
    let destination_location = {
        let task = world.get::<Task>(task_entity).unwrap();
        let vehicle = world.get::<Vehicle>(task.vehicle).unwrap();
        world.get::<crate::ecs::ParkingSpot>(vehicle.parking_spot).unwrap().location
    };
    let origin_location = world.get::<FleetSpecialist>(specialist_entity).unwrap().location;
    let distance = map.drive_distance(origin_location, destination_location);
    let travel_time = if timing.driving_speed_m_per_s > 0.0 {
        (distance / timing.driving_speed_m_per_s).round().max(0.0) as u64
    } else {
        0
    };

    {
        let mut specialist = world.get_mut::<FleetSpecialist>(specialist_entity).unwrap();
        specialist.next_task = Some(task_entity);
        specialist.task_destination = Some(destination_location);
        specialist.task_start_time = now;
        specialist.task_distance_driven = distance;
    }

    clock.schedule_in(
        travel_time,
        EventKind::SpecialistArrived,
        Some(EventSubject(specialist_entity)),
        0,
    );
}

/// Handles `SpecialistArrived`: validates the task is still resolvable
/// (active, its vehicle still parked where the specialist planned to find
/// it, and not mid-ride) before committing to the swap; otherwise logs a
/// miss and re-polls immediately.
pub fn handle_arrived(
    world: &mut World,
    clock: &mut SimulationClock,
    timing: &SpecialistTiming,
    specialist_entity: Entity,
) {
    let task_entity = world
        .get::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .next_task
        .unwrap();

    // The specialist physically arrives at the location it planned for,
    // whether or not the task is still there to be resolved.
    let planned_destination = world
        .get::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .task_destination
        .unwrap();
    world.get_mut::<FleetSpecialist>(specialist_entity).unwrap().location = planned_destination;

    let task = world.get::<Task>(task_entity).unwrap();
    let current_task_location = {
        let vehicle = world.get::<Vehicle>(task.vehicle).unwrap();
        world.get::<crate::ecs::ParkingSpot>(vehicle.parking_spot).unwrap().location
    };
    let still_valid = task.status == TaskStatus::Active
        && current_task_location == planned_destination
        && world.get::<Vehicle>(task.vehicle).unwrap().status != VehicleStatus::Riding;

    if !still_valid {
        eprintln!(
            "[{}] specialist {specialist_entity:?} missed task {task_entity:?}: vehicle relocated, already riding, or task resolved elsewhere",
            clock.now()
        );
        poll_now(clock, specialist_entity);
        return;
    }

    let vehicle_entity = world.get::<Task>(task_entity).unwrap().vehicle;
    vehicle::interrupt_idle(world, clock.now(), vehicle_entity);
    world.get_mut::<Task>(task_entity).unwrap().status = TaskStatus::Pending;

    let distance_driven = world
        .get::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .task_distance_driven;
    let dwell = if distance_driven != 0.0 {
        timing.time_per_swap_single_s
    } else {
        timing.time_per_swap_multiple_s
    };

    clock.schedule_in(
        dwell,
        EventKind::SpecialistSwapComplete,
        Some(EventSubject(specialist_entity)),
        0,
    );
}

/// Handles `SpecialistSwapComplete`: resolves the task, decrements the van's
/// battery stock, and moves on (refill if empty, otherwise poll again).
pub fn handle_swap_complete(
    world: &mut World,
    clock: &mut SimulationClock,
    registry: &mut TaskRegistry,
    thresholds: MaintenanceThresholds,
    timing: &SpecialistTiming,
    specialist_entity: Entity,
) {
    let task_entity = world
        .get_mut::<FleetSpecialist>(specialist_entity)
        .unwrap()
        .into_inner()
        .next_task
        .take()
        .unwrap();

    let now = clock.now();
    data_interface::resolve_task(world, clock, registry, thresholds, task_entity);

    {
        let mut task = world.get_mut::<Task>(task_entity).unwrap();
        task.resolved_time = Some(now);
        task.resolved_by = Some(specialist_entity);
    }

    let stock_remaining = {
        let mut specialist = world.get_mut::<FleetSpecialist>(specialist_entity).unwrap();
        specialist.van_battery_stock = specialist.van_battery_stock.saturating_sub(1);
        specialist.van_battery_stock
    };

    if stock_remaining == 0 {
        clock.schedule_in(
            timing.refill_van_batteries_time_s,
            EventKind::SpecialistRefillComplete,
            Some(EventSubject(specialist_entity)),
            0,
        );
    } else {
        poll_now(clock, specialist_entity);
    }
}

/// Handles `SpecialistRefillComplete`: restocks the van and resumes polling.
pub fn handle_refill_complete(
    world: &mut World,
    clock: &mut SimulationClock,
    specialist_entity: Entity,
) {
    let capacity = world.get::<FleetSpecialist>(specialist_entity).unwrap().van_capacity;
    world.get_mut::<FleetSpecialist>(specialist_entity).unwrap().van_battery_stock = capacity;
    poll_now(clock, specialist_entity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::ecs::ParkingSpot;
    use crate::map::{HaversineMap, Location};

    fn thresholds() -> MaintenanceThresholds {
        MaintenanceThresholds {
            swap_threshold: 0.25,
            bounty_threshold: 0.10,
        }
    }

    fn timing() -> SpecialistTiming {
        SpecialistTiming {
            driving_speed_m_per_s: 10.0,
            time_per_swap_single_s: 300,
            time_per_swap_multiple_s: 180,
            refill_van_batteries_time_s: 2400,
        }
    }

    #[test]
    fn poll_with_no_tasks_reschedules() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let map = HaversineMap::new(vec![]);
        let specialist_entity = world
            .spawn(FleetSpecialist::new(Location::new(0.0, 0.0), 0, 5))
            .id();

        handle_poll(&mut world, &mut clock, &mut registry, &map, &timing(), specialist_entity);
        let event = clock.pop_next().unwrap();
        assert_eq!(event.kind, EventKind::SpecialistPoll);
        assert_eq!(event.timestamp, POLL_INTERVAL_SECONDS);
    }

    #[test]
    fn full_cycle_resolves_task_and_decrements_stock() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let map = HaversineMap::new(vec![]);

        let spot = world.spawn(ParkingSpot::new(Location::new(0.001, 0.001))).id();
        let battery = Battery::new(1.0, 0.5, 0.05);
        let vehicle_entity = world.spawn(Vehicle::new(spot, battery)).id();
        let task_entity = world.spawn(Task::new(vehicle_entity, 0, 0.05)).id();
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().task = Some(task_entity);
        registry.add_task(task_entity);

        let specialist_entity = world
            .spawn(FleetSpecialist::new(Location::new(0.0, 0.0), 0, 5))
            .id();
        registry.add_specialist(specialist_entity);

        handle_poll(&mut world, &mut clock, &mut registry, &map, &timing(), specialist_entity);
        assert_eq!(clock.pop_next().unwrap().kind, EventKind::SpecialistArrived);

        handle_arrived(&mut world, &mut clock, &timing(), specialist_entity);
        assert_eq!(clock.pop_next().unwrap().kind, EventKind::SpecialistSwapComplete);

        handle_swap_complete(&mut world, &mut clock, &mut registry, thresholds(), &timing(), specialist_entity);

        assert!(!registry.contains(task_entity));
        assert_eq!(
            world.get::<FleetSpecialist>(specialist_entity).unwrap().van_battery_stock,
            4
        );
        assert_eq!(world.get::<Task>(task_entity).unwrap().resolved_by, Some(specialist_entity));
    }

    #[test]
    fn arrival_misses_task_when_vehicle_relocated_while_en_route() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let map = HaversineMap::new(vec![]);

        let spot = world.spawn(ParkingSpot::new(Location::new(0.001, 0.001))).id();
        let other_spot = world.spawn(ParkingSpot::new(Location::new(0.05, 0.05))).id();
        let battery = Battery::new(1.0, 0.5, 0.05);
        let vehicle_entity = world.spawn(Vehicle::new(spot, battery)).id();
        let task_entity = world.spawn(Task::new(vehicle_entity, 0, 0.05)).id();
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().task = Some(task_entity);
        registry.add_task(task_entity);

        let specialist_entity = world
            .spawn(FleetSpecialist::new(Location::new(0.0, 0.0), 0, 5))
            .id();
        registry.add_specialist(specialist_entity);

        handle_poll(&mut world, &mut clock, &mut registry, &map, &timing(), specialist_entity);
        assert_eq!(clock.pop_next().unwrap().kind, EventKind::SpecialistArrived);

        // The vehicle gets ridden away to a different spot while the
        // specialist is still en route to its originally planned location.
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().parking_spot = other_spot;
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().status = VehicleStatus::Ready;

        handle_arrived(&mut world, &mut clock, &timing(), specialist_entity);

        // Missed: the specialist replans immediately instead of swapping.
        assert_eq!(clock.pop_next().unwrap().kind, EventKind::SpecialistPoll);
        assert_eq!(world.get::<Task>(task_entity).unwrap().status, TaskStatus::Active);
        assert_eq!(
            world.get::<FleetSpecialist>(specialist_entity).unwrap().location,
            Location::new(0.001, 0.001)
        );
    }

    #[test]
    fn empty_van_triggers_refill() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let map = HaversineMap::new(vec![]);
        let specialist_entity = world
            .spawn(FleetSpecialist::new(Location::new(0.0, 0.0), 0, 1))
            .id();
        world.get_mut::<FleetSpecialist>(specialist_entity).unwrap().van_battery_stock = 0;

        handle_poll(&mut world, &mut clock, &mut registry, &map, &timing(), specialist_entity);
        let event = clock.pop_next().unwrap();
        assert_eq!(event.kind, EventKind::SpecialistRefillComplete);

        handle_refill_complete(&mut world, &mut clock, specialist_entity);
        assert_eq!(
            world.get::<FleetSpecialist>(specialist_entity).unwrap().van_battery_stock,
            1
        );
        assert_eq!(clock.pop_next().unwrap().kind, EventKind::SpecialistPoll);
    }
}
