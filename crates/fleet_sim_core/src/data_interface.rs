//! Coordinators shared by the rider and fleet-specialist processes: running a
//! vehicle through a ride, and resolving a battery-swap task.
//!
//! Grounded on `Datainterface.py`'s `vehicle_ride` and `resolve_task`, which
//! play the same "glue between two owning objects" role the original gives
//! a dedicated collaborator instead of letting `Vehicle` reach into
//! `ParkingSpot` directly.

use bevy_ecs::prelude::{Entity, World};

use crate::ecs::{ParkingSpot, Task, TaskStatus, Vehicle, VehicleStatus};
use crate::task_registry::TaskRegistry;
use crate::vehicle::{self, MaintenanceThresholds};

/// Marks `vehicle_entity` unavailable and riding. Call before scheduling a
/// `RiderRideComplete` event for the ride's duration.
pub fn begin_ride(world: &mut World, vehicle_entity: Entity) {
    let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
    vehicle.available = false;
    vehicle.status = VehicleStatus::Riding;
}

/// Runs the vehicle-side completion of a ride: discharges the battery for
/// the distance traveled, moves the vehicle's roster membership from its
/// origin spot to `destination_spot_entity`, flips status back to ready,
/// re-checks maintenance need and availability, and resumes idling.
pub fn complete_ride(
    world: &mut World,
    clock: &mut crate::clock::SimulationClock,
    registry: &mut TaskRegistry,
    vehicle_entity: Entity,
    destination_spot_entity: Entity,
    distance_m: f64,
    thresholds: MaintenanceThresholds,
) {
    let origin_spot_entity = world.get::<Vehicle>(vehicle_entity).unwrap().parking_spot;

    {
        let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
        vehicle.battery.discharge_ride(distance_m);
    }

    if origin_spot_entity != destination_spot_entity {
        if let Some(mut origin_spot) = world.get_mut::<ParkingSpot>(origin_spot_entity) {
            origin_spot.roster.retain(|&v| v != vehicle_entity);
        }
        if let Some(mut destination_spot) = world.get_mut::<ParkingSpot>(destination_spot_entity) {
            destination_spot.roster.push(vehicle_entity);
        }
    }

    {
        let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
        vehicle.parking_spot = destination_spot_entity;
        vehicle.status = VehicleStatus::Ready;
    }

    let now = clock.now();
    vehicle::check_maintenance_need(world, registry, vehicle_entity, thresholds, now);
    vehicle::update_availability(world, vehicle_entity);

    if world.get::<Vehicle>(vehicle_entity).unwrap().battery.level() > 0.0 {
        vehicle::start_idle(world, clock, vehicle_entity, thresholds);
    }
}

/// Resolves a battery-swap task: swaps in a full battery, deregisters the
/// task, detaches it from the vehicle, restores availability, and resumes
/// idling. Returns the battery level observed just before the swap, for the
/// caller to record on the task (`battery_incoming_at_swap`).
pub fn resolve_task(
    world: &mut World,
    clock: &mut crate::clock::SimulationClock,
    registry: &mut TaskRegistry,
    thresholds: MaintenanceThresholds,
    task_entity: Entity,
) -> f64 {
    let vehicle_entity = world.get::<Task>(task_entity).unwrap().vehicle;
    let incoming_level = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();

    {
        let mut vehicle = world.get_mut::<Vehicle>(vehicle_entity).unwrap();
        vehicle.battery.refill_full();
        vehicle.status = VehicleStatus::Ready;
        vehicle.task = None;
    }

    registry.remove_task(task_entity);

    {
        let mut task = world.get_mut::<Task>(task_entity).unwrap();
        task.status = TaskStatus::Resolved;
        task.battery_incoming_at_swap = Some(incoming_level);
    }

    vehicle::update_availability(world, vehicle_entity);
    vehicle::start_idle(world, clock, vehicle_entity, thresholds);

    incoming_level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::Battery;
    use crate::clock::SimulationClock;
    use crate::map::Location;

    fn thresholds() -> MaintenanceThresholds {
        MaintenanceThresholds {
            swap_threshold: 0.25,
            bounty_threshold: 0.10,
        }
    }

    #[test]
    fn complete_ride_moves_roster_and_discharges_battery() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();

        let origin = world.spawn(ParkingSpot::new(Location::new(0.0, 0.0))).id();
        let destination = world.spawn(ParkingSpot::new(Location::new(0.0, 0.0))).id();
        let battery = Battery::new(1.0, 0.5, 0.8);
        let vehicle_entity = world.spawn(Vehicle::new(origin, battery)).id();
        world.get_mut::<ParkingSpot>(origin).unwrap().roster.push(vehicle_entity);

        begin_ride(&mut world, vehicle_entity);
        complete_ride(
            &mut world,
            &mut clock,
            &mut registry,
            vehicle_entity,
            destination,
            500.0,
            thresholds(),
        );

        assert!(!world.get::<ParkingSpot>(origin).unwrap().roster.contains(&vehicle_entity));
        assert!(world.get::<ParkingSpot>(destination).unwrap().roster.contains(&vehicle_entity));
        let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Ready);
        assert!(vehicle.battery.level() < 0.8);
    }

    #[test]
    fn resolve_task_refills_and_deregisters() {
        let mut world = World::new();
        let mut clock = SimulationClock::default();
        let mut registry = TaskRegistry::default();

        let spot = world.spawn(ParkingSpot::new(Location::new(0.0, 0.0))).id();
        let battery = Battery::new(1.0, 0.5, 0.05);
        let vehicle_entity = world.spawn(Vehicle::new(spot, battery)).id();
        let task_entity = world.spawn(Task::new(vehicle_entity, 0, 0.05)).id();
        world.get_mut::<Vehicle>(vehicle_entity).unwrap().task = Some(task_entity);
        registry.add_task(task_entity);

        let incoming = resolve_task(&mut world, &mut clock, &mut registry, thresholds(), task_entity);
        assert!((incoming - 0.05).abs() < 1e-9);
        assert!(!registry.contains(task_entity));
        let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
        assert!(vehicle.task.is_none());
        assert_eq!(vehicle.battery.level(), crate::battery::CAPACITY);
        assert_eq!(world.get::<Task>(task_entity).unwrap().status, TaskStatus::Resolved);
    }
}
