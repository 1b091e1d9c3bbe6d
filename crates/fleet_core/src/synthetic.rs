//! Synthetic report sampling: plausible random content for telemetry,
//! issue, and status payloads.
//!
//! All randomization lives behind pure sampling functions so deterministic
//! seeded generators can stand in during tests without touching any
//! scheduling logic.

use rand::Rng;

use crate::ingest::VehicleDynamics;

pub const ISSUE_CATEGORIES: &[&str] =
    &["perception", "planning", "control", "localization", "system"];
pub const ISSUE_SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];
pub const TAKEOVER_TYPES: &[&str] =
    &["none", "driver_initiated", "system_initiated", "remote"];

/// All synthetic issues are tagged with this environment.
pub const ENVIRONMENT_TAG: &str = "simulation";

/// Randomized issue content, positioned and correlated by the caller.
#[derive(Debug, Clone)]
pub struct IssueDraw {
    pub category: String,
    pub severity: String,
    pub takeover_type: String,
    pub data_snapshot_uri: String,
    pub description: String,
}

/// Uniform instantaneous speed within the configured range, in m/s.
pub fn sample_speed_mps<R: Rng>(rng: &mut R, min_kmh: f64, max_kmh: f64) -> f64 {
    let min = min_kmh.min(max_kmh);
    rng.gen_range(min..=max_kmh.max(min)) / 3.6
}

/// Draw a random issue from the fixed enumerations.
pub fn sample_issue<R: Rng>(rng: &mut R) -> IssueDraw {
    let category = pick(rng, ISSUE_CATEGORIES);
    IssueDraw {
        severity: pick(rng, ISSUE_SEVERITIES),
        takeover_type: pick(rng, TAKEOVER_TYPES),
        data_snapshot_uri: format!("s3://sim-snapshots/{:016x}", rng.gen::<u64>()),
        description: format!("Simulated {category} issue"),
        category,
    }
}

/// Vehicle-dynamics snapshot with independently randomized values within
/// plausible bounds.
pub fn sample_dynamics<R: Rng>(rng: &mut R, speed_mps: f64, heading_deg: f64) -> VehicleDynamics {
    VehicleDynamics {
        speed_mps,
        acceleration_mps2: rng.gen_range(-3.0..=3.0),
        lateral_acceleration_mps2: rng.gen_range(-2.0..=2.0),
        yaw_rate_dps: rng.gen_range(-10.0..=10.0),
        heading_deg,
        steering_angle_deg: rng.gen_range(-30.0..=30.0),
        throttle_pct: rng.gen_range(0.0..=100.0),
        brake_pct: rng.gen_range(0.0..=30.0),
    }
}

pub fn sample_software_version<R: Rng>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}",
        rng.gen_range(1..=3),
        rng.gen_range(0..=9),
        rng.gen_range(0..=20)
    )
}

pub fn sample_hardware_version<R: Rng>(rng: &mut R) -> String {
    format!("{}{}", pick(rng, &["A", "B", "C"]), rng.gen_range(1..=4))
}

/// Battery level percentage; never below 20 so a simulated vehicle does not
/// look stranded.
pub fn sample_battery_pct<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(20.0..=100.0)
}

fn pick<R: Rng>(rng: &mut R, pool: &[&str]) -> String {
    pool[rng.gen_range(0..pool.len())].to_string()
}
