//! Road routing: converts waypoint routes into road-following paths via an
//! OSRM-compatible routing service.
//!
//! [`RoadRouter`] wraps a blocking HTTP client. A planned path is decoded
//! from the service's polyline6 geometry, capped to a bounded point count by
//! stride subsampling, and annotated with per-segment distance/duration
//! synthesized from the route totals. Batch snapping runs a small worker
//! pool as backpressure against the upstream service and degrades per route
//! on failure instead of aborting the batch.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use lru::LruCache;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::{bearing_deg, haversine_m, GeoPoint};
use crate::model::{RoadPath, RoadRoute, RoadSegment};

pub mod polyline;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Decoded geometries above this point count are stride-subsampled.
const MAX_PLAN_POINTS: usize = 800;

/// Concurrent in-flight requests during batch snapping.
const SNAP_WORKERS: usize = 3;

const PLAN_CACHE_CAPACITY: usize = 1024;

/// Errors talking to the upstream routing service.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("routing service returned code {0:?}")]
    Api(String),
    #[error("routing service returned no routes")]
    NoRoutes,
    #[error("invalid route geometry: {0}")]
    Geometry(#[from] polyline::DecodeError),
}

/// Minimal routing-service JSON response structures.
#[derive(Deserialize)]
struct RouteResponse {
    code: String,
    routes: Option<Vec<PlannedRoute>>,
}

#[derive(Deserialize)]
struct PlannedRoute {
    /// polyline6-encoded geometry.
    geometry: String,
    /// Total distance in meters.
    distance: f64,
    /// Total duration in seconds.
    duration: f64,
}

/// Client for the external routing service, with an LRU cache of
/// successfully planned paths keyed by the request coordinate string.
pub struct RoadRouter {
    client: Client,
    endpoint: String,
    cache: Mutex<LruCache<String, RoadPath>>,
}

impl RoadRouter {
    /// Create a router for the given endpoint (e.g. `http://localhost:5000`).
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build routing HTTP client");
        let capacity = NonZeroUsize::new(PLAN_CACHE_CAPACITY).expect("cache capacity must be > 0");
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Plan a road-following path through the given waypoints.
    ///
    /// Fewer than two waypoints is not an error: the waypoints come back
    /// verbatim with empty segments and zero totals. Upstream failures
    /// (HTTP errors, `code != "Ok"`, an empty route list) surface as
    /// [`RoutingError`].
    pub fn plan_road_route(&self, waypoints: &[GeoPoint]) -> Result<RoadPath, RoutingError> {
        if waypoints.len() < 2 {
            return Ok(RoadPath {
                points: waypoints.to_vec(),
                segments: Vec::new(),
                distance_m: 0.0,
                duration_s: 0.0,
            });
        }

        let coords = coord_segment(waypoints);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&coords) {
                return Ok(hit.clone());
            }
        }

        let url = format!(
            "{}/route/v1/driving/{}?overview=full&geometries=polyline6",
            self.endpoint, coords,
        );
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(RoutingError::Status(response.status()));
        }
        let parsed: RouteResponse = response.json()?;
        if parsed.code != "Ok" {
            return Err(RoutingError::Api(parsed.code));
        }
        let route = parsed
            .routes
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(RoutingError::NoRoutes)?;

        let points = downsample(polyline::decode(&route.geometry)?);
        debug!(points = points.len(), distance_m = route.distance, "planned road route");
        let path = build_path(points, route.distance, route.duration);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(coords, path.clone());
        }
        Ok(path)
    }

    /// Snap many routes onto the road network with bounded concurrency.
    ///
    /// A fixed pool of workers pulls routes off a shared index; per-route
    /// failures are logged and leave that route without a `road` attachment.
    /// Routes with fewer than two waypoints pass through unchanged. Input
    /// order is preserved.
    pub fn snap_routes_to_roads(&self, mut routes: Vec<RoadRoute>) -> Vec<RoadRoute> {
        let next = AtomicUsize::new(0);
        let roads: Vec<Mutex<Option<RoadPath>>> =
            (0..routes.len()).map(|_| Mutex::new(None)).collect();

        thread::scope(|scope| {
            for _ in 0..SNAP_WORKERS.min(routes.len()) {
                scope.spawn(|| loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    if idx >= routes.len() {
                        break;
                    }
                    let route = &routes[idx];
                    if route.waypoints.len() < 2 {
                        continue;
                    }
                    match self.plan_road_route(&route.waypoints) {
                        Ok(path) => {
                            if let Ok(mut slot) = roads[idx].lock() {
                                *slot = Some(path);
                            }
                        }
                        Err(err) => {
                            warn!(route = %route.id, error = %err,
                                "road snapping failed; keeping straight-line route");
                        }
                    }
                });
            }
        });

        for (route, slot) in routes.iter_mut().zip(roads) {
            route.road = slot.into_inner().unwrap_or(None);
        }
        routes
    }
}

fn coord_segment(waypoints: &[GeoPoint]) -> String {
    waypoints
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";")
}

/// Uniform fixed-stride subsampling down to [`MAX_PLAN_POINTS`], always
/// keeping the first and last point. Not a shape-preserving simplification.
fn downsample(points: Vec<GeoPoint>) -> Vec<GeoPoint> {
    if points.len() <= MAX_PLAN_POINTS {
        return points;
    }
    let stride = points.len().div_ceil(MAX_PLAN_POINTS);
    let last = points.len() - 1;
    points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % stride == 0 || *i == last)
        .map(|(_, p)| p)
        .collect()
}

/// Distribute route totals across consecutive-point great-circle distances
/// proportionally, and compute a compass heading per segment.
fn build_path(points: Vec<GeoPoint>, distance_m: f64, duration_s: f64) -> RoadPath {
    let legs: Vec<f64> = points.windows(2).map(|w| haversine_m(w[0], w[1])).collect();
    let total: f64 = legs.iter().sum();
    let segments = points
        .windows(2)
        .zip(&legs)
        .map(|(w, leg)| {
            let share = if total > 0.0 {
                leg / total
            } else {
                1.0 / legs.len() as f64
            };
            RoadSegment {
                from: w[0],
                to: w[1],
                distance_m: distance_m * share,
                duration_s: duration_s * share,
                heading_deg: bearing_deg(w[0], w[1]),
            }
        })
        .collect();
    RoadPath {
        points,
        segments,
        distance_m,
        duration_s,
    }
}

#[cfg(test)]
mod tests;
