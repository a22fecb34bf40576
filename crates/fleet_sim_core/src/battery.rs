//! Battery charge state and discharge/charge kinematics.
//!
//! Pure state, no scheduling: rates are pre-converted to per-base-unit at
//! construction (per meter for ride discharge, per second for idle discharge
//! and charging) so the hot path is a single multiply-and-clamp.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Battery {
    level: f64,
    /// Discharge per meter ridden (`DISCHARGE_RATE_RIDE_KM / 1000`).
    rate_ride_per_m: f64,
    /// Discharge per second idle (`DISCHARGE_RATE_IDLE_HR / 3600`).
    rate_idle_per_s: f64,
    /// Charge per second, if this battery is ever charged directly (vans
    /// swap in a fully-charged battery instead; kept for completeness).
    charge_rate_per_s: Option<f64>,
}

pub const CAPACITY: f64 = 1.0;

impl Battery {
    pub fn new(discharge_rate_ride_km: f64, discharge_rate_idle_hr: f64, level: f64) -> Self {
        Self {
            level: level.clamp(0.0, CAPACITY),
            rate_ride_per_m: discharge_rate_ride_km / 1000.0,
            rate_idle_per_s: discharge_rate_idle_hr / 3600.0,
            charge_rate_per_s: None,
        }
    }

    pub fn with_charge_rate(mut self, charge_rate_per_hr: f64) -> Self {
        self.charge_rate_per_s = Some(charge_rate_per_hr / 3600.0);
        self
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn idle_rate_per_s(&self) -> f64 {
        self.rate_idle_per_s
    }

    pub fn set_level(&mut self, level: f64) {
        self.level = level.clamp(0.0, CAPACITY);
    }

    pub fn refill_full(&mut self) {
        self.level = CAPACITY;
    }

    pub fn discharge_ride(&mut self, distance_m: f64) {
        self.level = (self.level - self.rate_ride_per_m * distance_m).max(0.0);
    }

    pub fn discharge_idle(&mut self, seconds: u64) {
        self.level = (self.level - self.rate_idle_per_s * seconds as f64).max(0.0);
    }

    pub fn charge(&mut self, seconds: u64) {
        if let Some(rate) = self.charge_rate_per_s {
            self.level = (self.level + rate * seconds as f64).min(CAPACITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discharge_ride_floors_at_zero() {
        let mut b = Battery::new(100.0, 5.0, 0.05);
        b.discharge_ride(1000.0);
        assert_eq!(b.level(), 0.0);
    }

    #[test]
    fn discharge_idle_matches_rate_conversion() {
        let mut b = Battery::new(0.1, 0.05, 0.30);
        // rate_idle_per_s = 0.05/3600; over 3600s drains 0.05.
        b.discharge_idle(3600);
        assert!((b.level() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn charge_caps_at_capacity() {
        let mut b = Battery::new(1.0, 1.0, 0.9).with_charge_rate(3600.0);
        b.charge(3600);
        assert_eq!(b.level(), CAPACITY);
    }

    #[test]
    fn level_clamped_on_construction() {
        let b = Battery::new(1.0, 1.0, 1.5);
        assert_eq!(b.level(), CAPACITY);
    }
}
