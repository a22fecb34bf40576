//! `Config`: the enumerated set of recognized simulation parameters
//! (specification §6). Loading from a file is out of scope for this crate;
//! `Config` derives `serde::Deserialize` so a harness binary can parse one
//! out of JSON and hand it to `Engine::new`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub city: String,
    pub num_of_vehicles: u32,
    pub num_simulated_days: u32,
    /// Trips per vehicle per day, used when no demand file is supplied.
    pub tvd: f64,
    /// km/h; converted internally to m/s.
    pub riding_speed_kmh: f64,
    /// km/h; converted internally to m/s.
    pub avg_fleet_specialist_travel_speed_kmh: f64,
    /// Meters.
    pub walk_radius_m: f64,
    pub discharge_rate_ride_km: f64,
    pub discharge_rate_idle_hr: f64,
    pub swap_threshold: f64,
    pub bounty_threshold: f64,
    pub time_per_swap_single_s: u64,
    pub time_per_swap_multiple_s: u64,
    pub refill_van_batteries_time_s: u64,
    pub van_battery_capacity: u32,
    pub num_of_fleet_specialists: u32,
}

impl Config {
    /// `RIDING_SPEED` converted from km/h to m/s.
    pub fn riding_speed_m_per_s(&self) -> f64 {
        self.riding_speed_kmh / 3.6
    }

    /// `AVG_FLEET_SPECIALIST_TRAVEL_SPEED` converted from km/h to m/s.
    pub fn driving_speed_m_per_s(&self) -> f64 {
        self.avg_fleet_specialist_travel_speed_kmh / 3.6
    }

    pub fn horizon_seconds(&self) -> u64 {
        self.num_simulated_days as u64 * 86_400
    }

    /// Fails fast on invalid threshold ordering, per the specification's
    /// configuration-error taxonomy (§7): "SWAP > BOUNTY > 0".
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.swap_threshold > self.bounty_threshold && self.bounty_threshold > 0.0) {
            return Err(ConfigError::InvalidThresholds {
                swap: self.swap_threshold,
                bounty: self.bounty_threshold,
            });
        }
        if self.time_per_swap_single_s < self.time_per_swap_multiple_s {
            return Err(ConfigError::InvalidSwapTiming {
                single: self.time_per_swap_single_s,
                multiple: self.time_per_swap_multiple_s,
            });
        }
        if self.num_of_vehicles == 0 {
            return Err(ConfigError::NoVehicles);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidThresholds { swap: f64, bounty: f64 },
    InvalidSwapTiming { single: u64, multiple: u64 },
    NoVehicles,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidThresholds { swap, bounty } => write!(
                f,
                "SWAP_THRESHOLD ({swap}) must be greater than BOUNTY_THRESHOLD ({bounty}), which must be greater than 0"
            ),
            ConfigError::InvalidSwapTiming { single, multiple } => write!(
                f,
                "TIME_PER_SWAP_SINGLE ({single}s) must be >= TIME_PER_SWAP_MULTIPLE ({multiple}s)"
            ),
            ConfigError::NoVehicles => write!(f, "NUM_OF_VEHICLES must be greater than 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    /// A small, fast-running default profile, useful for examples and tests.
    fn default() -> Self {
        Self {
            city: "testtown".to_string(),
            num_of_vehicles: 100,
            num_simulated_days: 1,
            tvd: 3.0,
            riding_speed_kmh: 18.0,
            avg_fleet_specialist_travel_speed_kmh: 36.0,
            walk_radius_m: 300.0,
            discharge_rate_ride_km: 1.0,
            discharge_rate_idle_hr: 0.5,
            swap_threshold: 0.25,
            bounty_threshold: 0.10,
            time_per_swap_single_s: 300,
            time_per_swap_multiple_s: 180,
            refill_van_batteries_time_s: 2400,
            van_battery_capacity: 10,
            num_of_fleet_specialists: 1,
        }
    }
}
