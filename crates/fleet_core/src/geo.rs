//! Geographic primitives: coordinates, great-circle distance, compass
//! bearing, and arc-length interpolation of waypoint paths.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle (haversine) distance between two points, in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Initial compass bearing from `a` to `b`, in degrees `[0, 360)`.
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlon = lon2 - lon1;
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Destination point reached by travelling `distance_km` from `origin` along
/// the given compass bearing.
pub fn offset_km(origin: GeoPoint, bearing_deg: f64, distance_km: f64) -> GeoPoint {
    let angular = distance_km * 1000.0 / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lng.to_radians();
    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());
    GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Interpolate a waypoint path into a dense coordinate sequence spaced at
/// approximately `step_km` arc length.
///
/// Each segment is subdivided proportionally by distance; the final waypoint
/// is always included. Paths with fewer than two waypoints (or a
/// non-positive step) are returned as-is.
pub fn interpolate_route(waypoints: &[GeoPoint], step_km: f64) -> Vec<GeoPoint> {
    if waypoints.len() < 2 || step_km <= 0.0 {
        return waypoints.to_vec();
    }

    let mut path = Vec::new();
    for window in waypoints.windows(2) {
        let (from, to) = (window[0], window[1]);
        let distance_km = haversine_km(from, to);
        let steps = ((distance_km / step_km).round() as usize).max(1);
        for i in 0..steps {
            let t = i as f64 / steps as f64;
            path.push(GeoPoint::new(
                from.lat + (to.lat - from.lat) * t,
                from.lng + (to.lng - from.lng) * t,
            ));
        }
    }
    path.push(waypoints[waypoints.len() - 1]);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Paris to London, roughly 344 km.
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let km = haversine_km(paris, london);
        assert!((km - 344.0).abs() < 5.0, "got {km}");
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = GeoPoint::new(37.7, -122.4);
        assert_eq!(haversine_m(p, p), 0.0);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!((bearing_deg(origin, GeoPoint::new(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((bearing_deg(origin, GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert!((bearing_deg(origin, GeoPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-6);
        assert!((bearing_deg(origin, GeoPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn offset_round_trips_through_haversine() {
        let origin = GeoPoint::new(37.75, -122.45);
        let dest = offset_km(origin, 45.0, 10.0);
        assert!((haversine_km(origin, dest) - 10.0).abs() < 0.01);
    }

    #[test]
    fn interpolate_spacing_close_to_step() {
        let waypoints = [GeoPoint::new(37.70, -122.45), GeoPoint::new(37.80, -122.45)];
        let path = interpolate_route(&waypoints, 0.5);
        assert!(path.len() > 10);
        for window in path.windows(2) {
            let km = haversine_km(window[0], window[1]);
            assert!(km < 0.8, "step too long: {km}");
        }
        assert_eq!(*path.last().expect("non-empty"), waypoints[1]);
    }

    #[test]
    fn interpolate_degenerate_input_is_identity() {
        let single = [GeoPoint::new(1.0, 2.0)];
        assert_eq!(interpolate_route(&single, 0.5), single.to_vec());
        assert!(interpolate_route(&[], 0.5).is_empty());
    }
}
