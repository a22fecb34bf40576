//! Rider process (specification §4.4): a one-shot trip request that departs,
//! picks an available vehicle (falling back to walking-distance neighbors),
//! rides, and parks, or gives up and is recorded unfulfilled.
//!
//! Grounded on `Rider.py`'s `process`/`ride_vehicle`/`park_vehicle`, split
//! into per-`EventKind` handlers the way the original's single coroutine is
//! split across `RiderDeparture` / `RiderRideComplete` / `RiderParkComplete`
//! in this engine's event-driven model.

use bevy_ecs::prelude::{Entity, World};

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::data_interface;
use crate::ecs::{ParkingSpot, Rider, RiderStatus, Vehicle, VehicleStatus};
use crate::map::Map;
use crate::vehicle::{self, MaintenanceThresholds};

/// Parking-delay dwell after a ride completes, before the rider is recorded
/// as having finished (`Rider.py::park_vehicle`, a fixed 30 seconds
/// regardless of distance).
pub const PARK_DWELL_SECONDS: u64 = 30;

/// Schedules a rider's `RiderDeparture` event at its configured departure
/// time. Call once per spawned rider.
pub fn schedule_departure(clock: &mut SimulationClock, rider_entity: Entity, departure_time: u64) {
    clock.schedule_at(
        departure_time,
        EventKind::RiderDeparture,
        Some(EventSubject(rider_entity)),
        0,
    );
}

/// Picks the first available vehicle at `spot_entity`, scanning its roster
/// in order (`ParkingSpot.pick_available_vehicle`).
fn pick_available_vehicle(world: &World, spot_entity: Entity) -> Option<Entity> {
    let spot = world.get::<ParkingSpot>(spot_entity)?;
    spot.roster
        .iter()
        .copied()
        .find(|&v| world.get::<Vehicle>(v).map(|vehicle| vehicle.available).unwrap_or(false))
}

/// Handles `RiderDeparture`: tries the origin spot, then each walking-radius
/// neighbor in order; if none has an available vehicle the rider ends here,
/// unfulfilled. Otherwise interrupts the vehicle's idle wait and schedules
/// `RiderRideComplete` for when the ride finishes.
pub fn handle_departure(
    world: &mut World,
    clock: &mut SimulationClock,
    map: &dyn Map,
    riding_speed_m_per_s: f64,
    rider_entity: Entity,
) {
    let (origin_entity, override_distance) = {
        let rider = world.get::<Rider>(rider_entity).unwrap();
        (rider.origin, rider.override_distance)
    };

    let mut pickup_spot = origin_entity;
    let mut vehicle_entity = pick_available_vehicle(world, pickup_spot);

    if vehicle_entity.is_none() {
        let neighbors = world
            .get::<ParkingSpot>(origin_entity)
            .map(|spot| spot.neighbors.clone())
            .unwrap_or_default();
        for neighbor_entity in neighbors {
            if let Some(found) = pick_available_vehicle(world, neighbor_entity) {
                pickup_spot = neighbor_entity;
                vehicle_entity = Some(found);
                break;
            }
        }
    }

    let Some(vehicle_entity) = vehicle_entity else {
        // Unfulfilled: no available vehicle at origin or any neighbor.
        return;
    };

    let now = clock.now();
    let destination_entity = world.get::<Rider>(rider_entity).unwrap().destination;
    let origin_location = world.get::<ParkingSpot>(pickup_spot).unwrap().location;
    let destination_location = world.get::<ParkingSpot>(destination_entity).unwrap().location;
    let battery_in = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();

    vehicle::interrupt_idle(world, now, vehicle_entity);
    data_interface::begin_ride(world, vehicle_entity);

    {
        let mut rider = world.get_mut::<Rider>(rider_entity).unwrap();
        rider.vehicle = Some(vehicle_entity);
        rider.ride_started_at = Some(now);
        rider.battery_in = Some(battery_in);
    }

    let distance = override_distance.unwrap_or_else(|| map.bike_distance(origin_location, destination_location));
    world.get_mut::<Rider>(rider_entity).unwrap().ride_distance = Some(distance);

    let duration = ride_duration_seconds(distance, riding_speed_m_per_s);
    clock.schedule_in(
        duration,
        EventKind::RiderRideComplete,
        Some(EventSubject(rider_entity)),
        0,
    );
}

/// `riding_speed_m_per_s` must come from the caller (`Config`); passed
/// explicitly so the event-dispatch layer decides when a ride fires, not
/// this module.
pub fn ride_duration_seconds(distance_m: f64, riding_speed_m_per_s: f64) -> u64 {
    if riding_speed_m_per_s <= 0.0 {
        return 0;
    }
    (distance_m / riding_speed_m_per_s).round().max(0.0) as u64
}

/// Handles `RiderRideComplete`: moves the vehicle to the destination
/// parking spot, discharges the battery, and schedules the parking dwell.
pub fn handle_ride_complete(
    world: &mut World,
    clock: &mut SimulationClock,
    registry: &mut crate::task_registry::TaskRegistry,
    thresholds: MaintenanceThresholds,
    rider_entity: Entity,
) {
    let (vehicle_entity, destination_entity, distance) = {
        let rider = world.get::<Rider>(rider_entity).unwrap();
        (rider.vehicle.unwrap(), rider.destination, rider.ride_distance.unwrap())
    };

    data_interface::complete_ride(
        world,
        clock,
        registry,
        vehicle_entity,
        destination_entity,
        distance,
        thresholds,
    );

    let battery_out = world.get::<Vehicle>(vehicle_entity).unwrap().battery.level();
    world.get_mut::<Rider>(rider_entity).unwrap().battery_out = Some(battery_out);

    clock.schedule_in(
        PARK_DWELL_SECONDS,
        EventKind::RiderParkComplete,
        Some(EventSubject(rider_entity)),
        0,
    );
}

/// Handles `RiderParkComplete`: marks the ride finished. Recording to
/// `Results` happens in the runner, reading the now-final `Rider` fields.
pub fn handle_park_complete(world: &mut World, rider_entity: Entity) {
    world.get_mut::<Rider>(rider_entity).unwrap().status = RiderStatus::Completed;
}
