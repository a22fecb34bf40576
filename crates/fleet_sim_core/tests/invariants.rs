//! Cross-cutting invariants checked against a full, randomized `Engine` run
//! rather than a single handler call: every vehicle appears in exactly one
//! parking spot's roster, every task's vehicle link resolves, and the total
//! vehicle count never drifts from what was requested at setup.

use bevy_ecs::prelude::Entity;

use fleet_sim_core::config::Config;
use fleet_sim_core::ecs::{ParkingSpot, Task, Vehicle};
use fleet_sim_core::engine::Engine;
use fleet_sim_core::map::{HaversineMap, Location};
use fleet_sim_core::telemetry::VecResults;

fn locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::new((i as f64) * 0.01, (i as f64) * 0.005))
        .collect()
}

fn run_engine(seed: u64) -> Engine {
    let locs = locations(8);
    let config = Config {
        num_of_vehicles: 20,
        num_of_fleet_specialists: 2,
        num_simulated_days: 1,
        tvd: 3.0,
        ..Config::default()
    };
    let map = Box::new(HaversineMap::new(locs.clone()));
    let results = Box::new(VecResults::default());
    let mut engine = Engine::new(config, map, results, seed, locs).unwrap();
    engine.spawn_uniform_demand();
    let horizon = engine.config.horizon_seconds();
    engine.run_to_horizon(horizon);
    engine
}

/// Every vehicle spawned at setup is still present, and each appears in
/// exactly one parking spot's roster: never zero, never two.
#[test]
fn every_vehicle_lives_in_exactly_one_roster_after_a_full_run() {
    let mut engine = run_engine(11);

    let mut vehicle_query = engine.world.query::<(Entity, &Vehicle)>();
    let vehicle_entities: Vec<Entity> = vehicle_query.iter(&engine.world).map(|(e, _)| e).collect();
    assert_eq!(vehicle_entities.len(), 20);

    for &vehicle_entity in &vehicle_entities {
        let appearances = engine
            .parking_spot_entities
            .iter()
            .filter(|&&spot_entity| {
                engine
                    .world
                    .get::<ParkingSpot>(spot_entity)
                    .unwrap()
                    .roster
                    .contains(&vehicle_entity)
            })
            .count();
        assert_eq!(
            appearances, 1,
            "vehicle {vehicle_entity:?} appeared in {appearances} rosters, expected exactly 1"
        );
    }

    let total_rostered: usize = engine
        .parking_spot_entities
        .iter()
        .map(|&spot_entity| engine.world.get::<ParkingSpot>(spot_entity).unwrap().roster.len())
        .sum();
    assert_eq!(total_rostered, 20);
}

/// Every task's `vehicle` link still resolves to a live `Vehicle`, and a
/// task the vehicle no longer points back to is not left dangling in the
/// vehicle's own `task` field after it resolves.
#[test]
fn task_vehicle_links_stay_consistent_after_a_full_run() {
    let mut engine = run_engine(23);

    let mut task_query = engine.world.query::<(Entity, &Task)>();
    for (task_entity, task) in task_query.iter(&engine.world) {
        let vehicle = engine
            .world
            .get::<Vehicle>(task.vehicle)
            .unwrap_or_else(|| panic!("task {task_entity:?} points at a missing vehicle"));

        if task.status == fleet_sim_core::ecs::TaskStatus::Resolved {
            assert_ne!(vehicle.task, Some(task_entity), "resolved task still linked from its vehicle");
        }
    }
}

/// A rider whose destination is the same spot as the origin (a degenerate
/// A -> A round trip) leaves the vehicle parked right back where it
/// started, since `complete_ride` only touches the rosters when origin and
/// destination differ.
#[test]
fn round_trip_ride_returns_vehicle_to_its_starting_spot() {
    use bevy_ecs::prelude::World;
    use fleet_sim_core::battery::Battery;
    use fleet_sim_core::clock::SimulationClock;
    use fleet_sim_core::rider;
    use fleet_sim_core::task_registry::TaskRegistry;
    use fleet_sim_core::vehicle::MaintenanceThresholds;

    let mut world = World::new();
    let mut clock = SimulationClock::default();
    let mut registry = TaskRegistry::default();
    let map = HaversineMap::new(vec![]);
    let thresholds = MaintenanceThresholds {
        swap_threshold: 0.25,
        bounty_threshold: 0.10,
    };

    let spot = world.spawn(ParkingSpot::new(Location::new(0.0, 0.0))).id();
    let battery = Battery::new(0.1, 0.5, 0.9);
    let vehicle_entity = world.spawn(Vehicle::new(spot, battery)).id();
    world.get_mut::<ParkingSpot>(spot).unwrap().roster.push(vehicle_entity);

    // Destination == origin: a round trip back to the same spot.
    let rider_entity = world
        .spawn(fleet_sim_core::ecs::Rider::new(spot, spot, 0, None, Some(0.0)))
        .id();

    rider::handle_departure(&mut world, &mut clock, &map, 5.0, rider_entity);
    rider::handle_ride_complete(&mut world, &mut clock, &mut registry, thresholds, rider_entity);
    rider::handle_park_complete(&mut world, rider_entity);

    let vehicle = world.get::<Vehicle>(vehicle_entity).unwrap();
    assert_eq!(vehicle.parking_spot, spot);
    assert!(world.get::<ParkingSpot>(spot).unwrap().roster.contains(&vehicle_entity));
}
