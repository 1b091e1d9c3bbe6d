//! Fleet and route generation: random vehicles and random waypoint routes
//! for sessions that do not supply their own.

use rand::Rng;

use crate::geo::{offset_km, GeoPoint};
use crate::model::{RoadRoute, SimVehicle, VehicleTemplate};

const PLATE_TYPES: &[&str] = &["standard", "test", "temporary"];
const MODEL_CODES: &[&str] = &["EV-M3", "EV-M5", "EV-X1", "HYB-S2"];
const PLATFORMS: &[&str] = &["orin-x2", "thor-u", "journey-5"];
const SOCS: &[&str] = &["soc-a720", "soc-x9", "soc-h510"];
const SENSOR_SUITES: &[&str] = &["lidar-7v", "vision-11v", "fusion-5r7v"];

/// VIN alphabet: uppercase alphanumerics minus I, O, Q.
const VIN_CHARS: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ0123456789";
const VIN_LEN: usize = 17;

/// Parameters for random route generation.
#[derive(Debug, Clone)]
pub struct RouteGenParams {
    pub start_point: GeoPoint,
    pub radius_km: f64,
    pub count: usize,
    pub min_waypoints: usize,
    pub max_waypoints: usize,
    /// When set, legs are sized so the whole route approximates this length.
    pub target_distance_km: Option<f64>,
}

/// Generate `count` random vehicles, applying template overrides when given.
pub fn generate_fleet<R: Rng>(
    rng: &mut R,
    count: usize,
    template: Option<&VehicleTemplate>,
) -> Vec<SimVehicle> {
    (0..count)
        .map(|_| {
            let mut vehicle = SimVehicle {
                vin: random_vin(rng),
                plate_type: pick(rng, PLATE_TYPES),
                model_code: pick(rng, MODEL_CODES),
                platform: pick(rng, PLATFORMS),
                soc: pick(rng, SOCS),
                sensor_suite: pick(rng, SENSOR_SUITES),
            };
            if let Some(template) = template {
                apply_template(&mut vehicle, template);
            }
            vehicle
        })
        .collect()
}

/// Generate random routes with waypoints inside `radius_km` of the start
/// point. Waypoint counts are uniform in `[min_waypoints, max_waypoints]`
/// (floored at 2 so every route is drivable).
pub fn generate_routes<R: Rng>(rng: &mut R, params: &RouteGenParams) -> Vec<RoadRoute> {
    let min_wp = params.min_waypoints.max(2);
    let max_wp = params.max_waypoints.max(min_wp);

    (0..params.count)
        .map(|_| {
            let count = rng.gen_range(min_wp..=max_wp);
            let waypoints = match params.target_distance_km {
                Some(target) if target > 0.0 => {
                    walk_waypoints(rng, params.start_point, params.radius_km, count, target)
                }
                _ => (0..count)
                    .map(|_| random_point_within_km(rng, params.start_point, params.radius_km))
                    .collect(),
            };
            RoadRoute::from_waypoints(format!("route-{:08x}", rng.gen::<u32>()), waypoints)
        })
        .collect()
}

/// Sample a point uniformly within `radius_km` of `origin`.
pub fn random_point_within_km<R: Rng>(rng: &mut R, origin: GeoPoint, radius_km: f64) -> GeoPoint {
    let bearing = rng.gen_range(0.0..360.0);
    // sqrt keeps the distribution uniform over the disk area.
    let distance = radius_km.max(0.0) * rng.gen::<f64>().sqrt();
    offset_km(origin, bearing, distance)
}

/// Hop from a random start point with fixed-length legs in random directions
/// so the route length approximates `target_km`.
fn walk_waypoints<R: Rng>(
    rng: &mut R,
    origin: GeoPoint,
    radius_km: f64,
    count: usize,
    target_km: f64,
) -> Vec<GeoPoint> {
    let leg_km = target_km / (count - 1) as f64;
    let mut waypoints = Vec::with_capacity(count);
    let mut current = random_point_within_km(rng, origin, radius_km);
    waypoints.push(current);
    for _ in 1..count {
        current = offset_km(current, rng.gen_range(0.0..360.0), leg_km);
        waypoints.push(current);
    }
    waypoints
}

fn random_vin<R: Rng>(rng: &mut R) -> String {
    (0..VIN_LEN)
        .map(|_| VIN_CHARS[rng.gen_range(0..VIN_CHARS.len())] as char)
        .collect()
}

fn pick<R: Rng>(rng: &mut R, pool: &[&str]) -> String {
    pool[rng.gen_range(0..pool.len())].to_string()
}

fn apply_template(vehicle: &mut SimVehicle, template: &VehicleTemplate) {
    if let Some(plate_type) = &template.plate_type {
        vehicle.plate_type = plate_type.clone();
    }
    if let Some(model_code) = &template.model_code {
        vehicle.model_code = model_code.clone();
    }
    if let Some(platform) = &template.platform {
        vehicle.platform = platform.clone();
    }
    if let Some(soc) = &template.soc {
        vehicle.soc = soc.clone();
    }
    if let Some(sensor_suite) = &template.sensor_suite {
        vehicle.sensor_suite = sensor_suite.clone();
    }
}
