//! Discrete-event simulation of a shared micromobility fleet: vehicles
//! discharge while idle and while ridden, riders come and go, and fleet
//! specialists swap batteries on vehicles that run low.
//!
//! Built on `bevy_ecs`'s `World` as a plain entity/component store (no
//! `Schedule`/systems layer, see `engine::Engine::dispatch`); a min-heap
//! event queue (`clock::SimulationClock`) drives virtual time forward one
//! event at a time, in place of the coroutine-per-actor model the original
//! Python implementation used.

pub mod battery;
pub mod clock;
pub mod config;
pub mod data_interface;
pub mod distributions;
pub mod ecs;
pub mod engine;
pub mod map;
pub mod rider;
pub mod specialist;
pub mod task_registry;
pub mod telemetry;
pub mod vehicle;
