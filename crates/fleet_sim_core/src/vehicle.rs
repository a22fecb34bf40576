//! Vehicle idle-drain state machine (specification §4.3), the only
//! nontrivial process in the engine: a vehicle idles until it crosses the
//! swap or bounty threshold, is interrupted early whenever a rider picks it
//! up, and resumes idling (stamped with a fresh token) whenever it's parked
//! again with charge remaining.
//!
//! Grounded on `Vehicleclass.py`'s `idle`/`check_maintenance_need`/
//! `update_availability`/`interrupt_idle_process`/`resume_idle`, reimplemented
//! as scheduled `Event`s instead of a suspendable coroutine (see the
//! `idle_token` field on `Vehicle`).

use bevy_ecs::prelude::{Entity, World};

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::ecs::{Task, TaskStatus, Vehicle, VehicleStatus};
use crate::task_registry::TaskRegistry;

/// Parameters the idle/maintenance machinery needs from `Config`, passed
/// explicitly rather than depending on the `config` module so this stays
/// usable from unit tests with ad hoc thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceThresholds {
    pub swap_threshold: f64,
    pub bounty_threshold: f64,
}

/// Creates a battery-swap task for `vehicle` if its battery is at or below
/// `SWAP_THRESHOLD` and it doesn't already have one; escalates an existing
/// or just-created task to a bounty if the battery is at or below
/// `BOUNTY_THRESHOLD`. Mirrors `check_maintenance_need` exactly, including
/// the original's quirk of only escalating a task that exists by the time
/// this runs (a vehicle whose battery free-falls past both thresholds in one
/// idle step gets the task and the bounty in the same call).
pub fn check_maintenance_need(
    world: &mut World,
    registry: &mut TaskRegistry,
    vehicle_entity: Entity,
    thresholds: MaintenanceThresholds,
    now: u64,
) {
    let level = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();

    if level <= thresholds.swap_threshold && world.get::<Vehicle>(vehicle_entity).unwrap().task.is_none()
    {
        let task_entity = world
            .spawn(Task::new(vehicle_entity, now, level))
            .id();
        registry.add_task(task_entity);
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().task = Some(task_entity);
    }

    if level <= thresholds.bounty_threshold {
        if let Some(task_entity) = world.get::<Vehicle>(vehicle_entity).unwrap().task {
            let mut task = world.get_mut::<Task>(task_entity).unwrap();
            task.bounty = true;
            task.bounty_time = Some(now);
            drop(task);
            world.get_mut::<Vehicle>(vehicle_entity).unwrap().status = VehicleStatus::Bounty;
        }
    }
}

/// `available = task.is_none() || !task.bounty` (specification §4.3).
pub fn update_availability(world: &mut World, vehicle_entity: Entity) {
    let task_entity = world.get::<Vehicle>(vehicle_entity).unwrap().task;
    let available = match task_entity {
        None => true,
        Some(task_entity) => !world.get::<Task>(task_entity).unwrap().bounty,
    };
    world.get_mut::<Vehicle>(vehicle_entity).unwrap().available = available;
}

/// Starts (or restarts) a vehicle's idle-drain wait: computes the next
/// threshold the battery will cross, schedules a `VehicleIdleWake` for the
/// time it would take to drain there at the idle discharge rate, and stamps
/// both the vehicle's `idle_start` and the event with the vehicle's current
/// `idle_token` so a later `interrupt_idle` can invalidate it.
pub fn start_idle(
    world: &mut World,
    clock: &mut SimulationClock,
    vehicle_entity: Entity,
    thresholds: MaintenanceThresholds,
) {
    let now = clock.now();
    let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
    let level = vehicle.battery.level();

    let next_update_level = if level > thresholds.swap_threshold {
        thresholds.swap_threshold
    } else if level > thresholds.bounty_threshold {
        thresholds.bounty_threshold
    } else {
        0.0
    };

    let idle_rate = vehicle.battery.idle_rate_per_s();
    let delta_seconds = if idle_rate > 0.0 {
        ((level - next_update_level) / idle_rate).round().max(0.0) as u64
    } else {
        0
    };

    vehicle.idle_start = Some(now);
    let token = vehicle.idle_token;
    drop(vehicle);

    clock.schedule_in(
        delta_seconds,
        EventKind::VehicleIdleWake,
        Some(EventSubject(vehicle_entity)),
        token,
    );
}

/// Handles a `VehicleIdleWake` event. Ignores it if `token` is stale (the
/// vehicle was interrupted since this wake was scheduled). Otherwise drains
/// the battery to the threshold it reached, runs maintenance/availability
/// checks, and restarts idling if any charge remains.
pub fn handle_idle_wake(
    world: &mut World,
    clock: &mut SimulationClock,
    registry: &mut TaskRegistry,
    vehicle_entity: Entity,
    token: u64,
    thresholds: MaintenanceThresholds,
) {
    let Some(mut vehicle) = world.get_mut::<Vehicle>(vehicle_entity) else {
        return;
    };
    if vehicle.idle_token != token {
        return; // stale wake: vehicle was interrupted (picked up) in the meantime.
    }

    let level = vehicle.battery.level();
    let next_update_level = if level > thresholds.swap_threshold {
        thresholds.swap_threshold
    } else if level > thresholds.bounty_threshold {
        thresholds.bounty_threshold
    } else {
        0.0
    };
    vehicle.battery.set_level(next_update_level);
    vehicle.idle_start = None;
    drop(vehicle);

    let now = clock.now();
    check_maintenance_need(world, registry, vehicle_entity, thresholds, now);
    update_availability(world, vehicle_entity);

    if world.get::<Vehicle>(vehicle_entity).unwrap().battery.level() > 0.0 {
        start_idle(world, clock, vehicle_entity, thresholds);
    }
}

/// Interrupts a vehicle's idle wait: drains the battery for the time it
/// actually spent idling (rather than jumping to the threshold it was
/// heading toward), and bumps `idle_token` so the pending wake event becomes
/// a no-op. A vehicle that isn't currently idling (`idle_start` is `None`,
/// e.g. already riding) is left untouched, matching the original's
/// "interrupt on an already-terminated process is a no-op" rule.
pub fn interrupt_idle(world: &mut World, now: u64, vehicle_entity: Entity) {
    let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
    let Some(idle_start) = vehicle.idle_start.take() else {
        return;
    };
    let idle_seconds = now.saturating_sub(idle_start);
    vehicle.battery.discharge_idle(idle_seconds);
    vehicle.idle_token += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::ecs::ParkingSpot;
    use crate::map::Location;

    fn thresholds() -> MaintenanceThresholds {
        MaintenanceThresholds {
            swap_threshold: 0.25,
            bounty_threshold: 0.10,
        }
    }

    fn spawn_vehicle(world: &mut World, level: f64) -> Entity {
        let spot = world.spawn(ParkingSpot::new(Location::new(0.0, 0.0))).id();
        let battery = Battery::new(1.0, 0.5, level);
        world.spawn(Vehicle::new(spot, battery)).id()
    }

    #[test]
    fn idle_wake_creates_task_at_swap_threshold() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let vehicle_entity = spawn_vehicle(&mut world, 0.30);

        start_idle(&mut world, &mut clock, vehicle_entity, thresholds());
        let event = clock.pop_next().unwrap();
        handle_idle_wake(
            &mut world,
            &mut clock,
            &mut registry,
            vehicle_entity,
            event.token,
            thresholds(),
        );

        let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
        assert!((vehicle.battery.level() - 0.25).abs() < 1e-9);
        assert!(vehicle.task.is_some());
        assert_eq!(registry.task_count(), 1);
    }

    #[test]
    fn bounty_threshold_marks_vehicle_unavailable() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let vehicle_entity = spawn_vehicle(&mut world, 0.10);

        check_maintenance_need(&mut world, &mut registry, vehicle_entity, thresholds(), 0);
        update_availability(&mut world, vehicle_entity);

        let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Bounty);
        assert!(!vehicle.available);
        let task = world.get::<Task>(vehicle.task.unwrap()).unwrap();
        assert!(task.bounty);
    }

    #[test]
    fn stale_wake_token_is_ignored() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();
        let vehicle_entity = spawn_vehicle(&mut world, 0.5);

        start_idle(&mut world, &mut clock, vehicle_entity, thresholds());
        let event = clock.pop_next().unwrap();

        // Interrupt before the wake fires: bumps idle_token.
        interrupt_idle(&mut world, clock.now(), vehicle_entity);
        let level_after_interrupt = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();

        handle_idle_wake(
            &mut world,
            &mut clock,
            &mut registry,
            vehicle_entity,
            event.token,
            thresholds(),
        );

        // The stale wake must not have touched the battery any further.
        let level_after_wake = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();
        assert_eq!(level_after_interrupt, level_after_wake);
    }

    #[test]
    fn interrupt_on_non_idling_vehicle_is_noop() {
        let mut world = World::new();
        let vehicle_entity = spawn_vehicle(&mut world, 0.5);
        // idle_start is None (never started idling), so this must be a no-op.
        interrupt_idle(&mut world, 100, vehicle_entity);
        let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
        assert_eq!(vehicle.battery.level(), 0.5);
        assert_eq!(vehicle.idle_token, 0);
    }
}
