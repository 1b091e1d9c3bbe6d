//! Domain model: vehicles, routes, driving modes, and the simulation
//! session definition the engine activates.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A simulated vehicle identity. Immutable for the lifetime of a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimVehicle {
    pub vin: String,
    pub plate_type: String,
    pub model_code: String,
    pub platform: String,
    pub soc: String,
    pub sensor_suite: String,
}

/// Optional attribute overrides applied to generated vehicles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleTemplate {
    pub plate_type: Option<String>,
    pub model_code: Option<String>,
    pub platform: Option<String>,
    pub soc: Option<String>,
    pub sensor_suite: Option<String>,
}

/// One leg of a snapped road path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_m: f64,
    pub duration_s: f64,
    pub heading_deg: f64,
}

/// Dense road-following path attached to a route after snapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadPath {
    pub points: Vec<GeoPoint>,
    pub segments: Vec<RoadSegment>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// A drivable route: authored waypoints plus an optional snapped road path.
///
/// Without `road` the route is driven as a straight-line interpolation
/// between waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadRoute {
    pub id: String,
    pub name: String,
    pub waypoints: Vec<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub road: Option<RoadPath>,
}

impl RoadRoute {
    pub fn from_waypoints(id: impl Into<String>, waypoints: Vec<GeoPoint>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            waypoints,
            road: None,
        }
    }

    /// The coordinate sequence a runner drives: the snapped road path when
    /// present, the raw waypoints otherwise.
    pub fn drive_points(&self) -> &[GeoPoint] {
        match &self.road {
            Some(road) if !road.points.is_empty() => &road.points,
            _ => &self.waypoints,
        }
    }
}

/// Session lifecycle status, owned by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Aborted,
}

/// How a fleet or route set is resolved at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    #[default]
    Random,
    Custom,
}

/// Fleet resolution config: an explicit vehicle list, or a generated fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub mode: ResolveMode,
    pub vehicle_count: usize,
    #[serde(default)]
    pub vehicles: Vec<SimVehicle>,
    #[serde(default)]
    pub template: Option<VehicleTemplate>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            mode: ResolveMode::Random,
            vehicle_count: 5,
            vehicles: Vec::new(),
            template: None,
        }
    }
}

/// Route resolution config: explicit routes, or random generation around a
/// start point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub mode: ResolveMode,
    #[serde(default)]
    pub routes: Vec<RoadRoute>,
    pub start_point: GeoPoint,
    pub radius_km: f64,
    pub min_waypoints: usize,
    pub max_waypoints: usize,
    /// Snap resolved routes onto the road network when a router is available.
    #[serde(default)]
    pub snap_to_roads: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            mode: ResolveMode::Random,
            routes: Vec::new(),
            // San Francisco, mid-peninsula.
            start_point: GeoPoint::new(37.7749, -122.4194),
            radius_km: 5.0,
            min_waypoints: 3,
            max_waypoints: 8,
            snap_to_roads: false,
        }
    }
}

/// Report cadence and speed range for every runner of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub telemetry_interval_s: f64,
    pub issue_interval_min_s: f64,
    pub issue_interval_max_s: f64,
    pub mode_switch_interval_s: f64,
    pub speed_min_kmh: f64,
    pub speed_max_kmh: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_s: 1.0,
            issue_interval_min_s: 30.0,
            issue_interval_max_s: 120.0,
            mode_switch_interval_s: 60.0,
            speed_min_kmh: 20.0,
            speed_max_kmh: 60.0,
        }
    }
}

impl ReportConfig {
    pub fn avg_speed_kmh(&self) -> f64 {
        (self.speed_min_kmh + self.speed_max_kmh) / 2.0
    }

    /// Arc length of one telemetry tick: the distance covered at mid-range
    /// speed over one telemetry interval, floored at 10 m so a degenerate
    /// config never produces a zero-length step.
    pub fn step_km(&self) -> f64 {
        (self.avg_speed_kmh() / 3600.0 * self.telemetry_interval_s).max(0.01)
    }
}

/// Explicit vehicle/project/task/route binding for one runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub vin: String,
    pub project_id: String,
    pub task_id: String,
    #[serde(default)]
    pub route_id: Option<String>,
}

/// Cumulative session statistics, written back on stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub telemetry_sent: u64,
    pub issues_sent: u64,
    pub total_mileage_km: f64,
}

/// One configured simulation run: what to drive, where, and how to report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSession {
    pub id: String,
    pub name: String,
    pub status: SessionStatus,
    pub fleet: FleetConfig,
    pub routes: RouteConfig,
    pub report: ReportConfig,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub stats: SessionStats,
    /// Random seed for reproducibility (optional; entropy when absent).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationSession {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: SessionStatus::Draft,
            fleet: FleetConfig::default(),
            routes: RouteConfig::default(),
            report: ReportConfig::default(),
            assignments: Vec::new(),
            stats: SessionStats::default(),
            seed: None,
        }
    }
}

/// Driving modes cycled by the mode-switch timer, in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrivingMode {
    Manual,
    #[serde(rename = "ACC")]
    Acc,
    #[serde(rename = "LCC")]
    Lcc,
    HighwayPilot,
    UrbanPilot,
}

impl DrivingMode {
    pub const CYCLE: [DrivingMode; 5] = [
        DrivingMode::Manual,
        DrivingMode::Acc,
        DrivingMode::Lcc,
        DrivingMode::HighwayPilot,
        DrivingMode::UrbanPilot,
    ];

    /// The next mode in the fixed cyclic order, wrapping from last to first.
    pub fn next(self) -> Self {
        match self {
            DrivingMode::Manual => DrivingMode::Acc,
            DrivingMode::Acc => DrivingMode::Lcc,
            DrivingMode::Lcc => DrivingMode::HighwayPilot,
            DrivingMode::HighwayPilot => DrivingMode::UrbanPilot,
            DrivingMode::UrbanPilot => DrivingMode::Manual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrivingMode::Manual => "Manual",
            DrivingMode::Acc => "ACC",
            DrivingMode::Lcc => "LCC",
            DrivingMode::HighwayPilot => "HighwayPilot",
            DrivingMode::UrbanPilot => "UrbanPilot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cycle_returns_to_start_after_five_switches() {
        for start in DrivingMode::CYCLE {
            let mut mode = start;
            let mut seen = vec![mode];
            for _ in 0..5 {
                mode = mode.next();
                seen.push(mode);
            }
            assert_eq!(mode, start);
            // No mode skipped: all five distinct modes appear in one cycle.
            for expected in DrivingMode::CYCLE {
                assert!(seen.contains(&expected));
            }
        }
    }

    #[test]
    fn step_km_floors_degenerate_configs() {
        let report = ReportConfig {
            speed_min_kmh: 0.0,
            speed_max_kmh: 0.0,
            telemetry_interval_s: 1.0,
            ..ReportConfig::default()
        };
        assert_eq!(report.step_km(), 0.01);
    }

    #[test]
    fn step_km_matches_mid_range_speed() {
        let report = ReportConfig {
            speed_min_kmh: 30.0,
            speed_max_kmh: 50.0,
            telemetry_interval_s: 2.0,
            ..ReportConfig::default()
        };
        // 40 km/h over 2 s.
        assert!((report.step_km() - 40.0 / 3600.0 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn drive_points_prefers_snapped_road() {
        let waypoints = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)];
        let mut route = RoadRoute::from_waypoints("r1", waypoints.clone());
        assert_eq!(route.drive_points(), waypoints.as_slice());

        let dense = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.5, 0.6),
            GeoPoint::new(1.0, 1.0),
        ];
        route.road = Some(RoadPath {
            points: dense.clone(),
            segments: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
        });
        assert_eq!(route.drive_points(), dense.as_slice());
    }

    #[test]
    fn driving_mode_serializes_wire_names() {
        let json = serde_json::to_string(&DrivingMode::Acc).expect("serialize");
        assert_eq!(json, "\"ACC\"");
        let json = serde_json::to_string(&DrivingMode::HighwayPilot).expect("serialize");
        assert_eq!(json, "\"HighwayPilot\"");
    }
}
