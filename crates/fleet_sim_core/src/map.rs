//! `Map`: the external geospatial collaborator.
//!
//! Out of scope per the specification: shortest-path routing over road/bike
//! graphs, KD-tree nearest-neighbor search, and polygon containment are all
//! declared as a trait here, not implemented against real map data. A
//! lightweight `HaversineMap` reference implementation (Euclidean-ish
//! great-circle distance plus brute-force neighbor/nearest search) is
//! provided so the engine is runnable in tests and examples without a real
//! routing backend, mirroring how the teacher crate's `RouteProvider` trait
//! (`routing.rs`) ships an always-available `H3GridRouteProvider` alongside
//! the pluggable real backends.

use bevy_ecs::prelude::Resource;

/// An opaque routing-graph node handle. `Location` may cache one per graph
/// (drive, bike) so a real `Map` implementation can skip repeated
/// nearest-node lookups; the core never inspects these values.
pub type RoutingNodeId = u64;

/// Immutable geographic point, optionally carrying cached nearest-node
/// handles for the drive and bike routing graphs (specification §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
    pub drive_node: Option<RoutingNodeId>,
    pub bike_node: Option<RoutingNodeId>,
}

impl Location {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon,
            lat,
            drive_node: None,
            bike_node: None,
        }
    }

    pub fn with_nodes(mut self, drive_node: RoutingNodeId, bike_node: RoutingNodeId) -> Self {
        self.drive_node = Some(drive_node);
        self.bike_node = Some(bike_node);
        self
    }
}

/// A simple closed polygon for fleet-specialist focus areas, in (lon, lat)
/// pairs. Containment is a standalone function (`point_in_polygon`) rather
/// than a method so alternative `Map` implementations can reuse it without
/// depending on this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<(f64, f64)>,
}

/// Ray-casting point-in-polygon test. `vertices` need not be closed
/// (the last point is implicitly connected back to the first).
pub fn point_in_polygon(point: (f64, f64), vertices: &[(f64, f64)]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let (px, py) = point;
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > py) != (yj > py) {
            let x_intersect = xj + (py - yj) / (yi - yj) * (xi - xj);
            if px < x_intersect {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Earth radius in meters, for great-circle distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle (haversine) distance between two points, in meters.
pub fn haversine_distance_m(a: Location, b: Location) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// External geospatial collaborator (specification §6). Implementations may
/// be backed by a real road/bike graph and KD-tree; the core only ever goes
/// through this trait.
pub trait Map: Send + Sync {
    /// Road-network driving distance in meters, for fleet specialists.
    fn drive_distance(&self, a: Location, b: Location) -> f64;
    /// Bike-network riding distance in meters, for rider trips.
    fn bike_distance(&self, a: Location, b: Location) -> f64;
    /// Index of the nearest parking spot to `loc`, among spots the
    /// implementation was built with.
    fn nearest_parking_spot_index(&self, loc: Location) -> Option<usize>;
    /// Indices of parking spots within `radius_m` of `loc` (insertion
    /// order; excludes the spot's own index when `loc` matches it exactly).
    fn neighbor_indices_within(&self, loc: Location, radius_m: f64) -> Vec<usize>;
    /// Whether `loc` falls inside `polygon`.
    fn contains(&self, polygon: &Polygon, loc: Location) -> bool {
        point_in_polygon((loc.lon, loc.lat), &polygon.vertices)
    }
}

/// Reference `Map`: great-circle distance with no real road/bike graph.
/// Bike distance is scaled 1.2x and drive distance 1.4x over the
/// greatcircle, matching the specification's stated fallback multipliers
/// for "no route exists on the graph" (here: always, since there is no
/// graph).
#[derive(Debug, Clone, Resource)]
pub struct HaversineMap {
    parking_spot_locations: Vec<Location>,
}

impl HaversineMap {
    pub fn new(parking_spot_locations: Vec<Location>) -> Self {
        Self {
            parking_spot_locations,
        }
    }
}

impl Map for HaversineMap {
    fn drive_distance(&self, a: Location, b: Location) -> f64 {
        haversine_distance_m(a, b) * 1.4
    }

    fn bike_distance(&self, a: Location, b: Location) -> f64 {
        haversine_distance_m(a, b) * 1.2
    }

    fn nearest_parking_spot_index(&self, loc: Location) -> Option<usize> {
        self.parking_spot_locations
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                haversine_distance_m(loc, **a)
                    .partial_cmp(&haversine_distance_m(loc, **b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }

    fn neighbor_indices_within(&self, loc: Location, radius_m: f64) -> Vec<usize> {
        self.parking_spot_locations
            .iter()
            .enumerate()
            .filter(|(_, &candidate)| {
                candidate != loc && haversine_distance_m(loc, candidate) <= radius_m
            })
            .map(|(i, _)| i)
            .collect()
    }
}
