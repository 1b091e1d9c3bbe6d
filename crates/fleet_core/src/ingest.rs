//! Ingestion boundary: the wire payloads runners emit and the sink they
//! post through.
//!
//! Delivery is best-effort: callers inspect the result only to decide
//! whether to increment a counter, never to retry.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use thiserror::Error;

use crate::model::DrivingMode;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TELEMETRY_PATH: &str = "/api/v1/telemetry";
const ISSUES_PATH: &str = "/api/v1/issues";
const STATUS_PATH: &str = "/api/v1/vehicle-status";

/// Errors posting to the ingestion boundary. Swallowed by runners.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ingestion endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Vehicle operational status carried in status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleStatus {
    Active,
    Idle,
}

/// One periodic position/speed/heading report.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub vehicle_id: String,
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
    pub lat: f64,
    pub lng: f64,
    pub speed_mps: f64,
    /// Incremental mileage covered since the previous tick.
    pub mileage_km: f64,
    pub driving_mode: DrivingMode,
    pub heading_deg: f64,
}

/// Randomized vehicle-dynamics snapshot attached to an issue.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleDynamics {
    pub speed_mps: f64,
    pub acceleration_mps2: f64,
    pub lateral_acceleration_mps2: f64,
    pub yaw_rate_dps: f64,
    pub heading_deg: f64,
    pub steering_angle_deg: f64,
    pub throttle_pct: f64,
    pub brake_pct: f64,
}

/// One synthetic issue report, correlated to a run/task/project.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub run_id: String,
    pub project_id: String,
    pub task_id: String,
    /// Epoch milliseconds, UTC.
    pub trigger_timestamp: i64,
    pub gps_lat: f64,
    pub gps_lng: f64,
    pub category: String,
    pub severity: String,
    pub takeover_type: String,
    pub data_snapshot_uri: String,
    pub environment_tags: Vec<String>,
    pub description: String,
    pub vehicle_dynamics: VehicleDynamics,
}

/// Vehicle status report sent on runner start and stop.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub vehicle_id: String,
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
    pub status: VehicleStatus,
    pub software_version: String,
    pub hardware_version: String,
    pub fuel_or_battery_level: f64,
    pub driving_mode: DrivingMode,
    pub lat: f64,
    pub lng: f64,
}

/// Sink for runner reports. Implementations must be shareable across
/// runner timer threads.
pub trait IngestSink: Send + Sync {
    fn post_telemetry(&self, report: &TelemetryReport) -> Result<(), IngestError>;
    fn post_issue(&self, report: &IssueReport) -> Result<(), IngestError>;
    fn post_status(&self, report: &StatusReport) -> Result<(), IngestError>;
}

/// Blocking HTTP sink posting JSON bodies to the ingestion service.
pub struct HttpIngestClient {
    client: Client,
    base_url: String,
}

impl HttpIngestClient {
    /// Create a client for the given base URL (e.g. `http://localhost:8080`).
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build ingestion HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), IngestError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()?;
        if !response.status().is_success() {
            return Err(IngestError::Status(response.status()));
        }
        Ok(())
    }
}

impl IngestSink for HttpIngestClient {
    fn post_telemetry(&self, report: &TelemetryReport) -> Result<(), IngestError> {
        self.post(TELEMETRY_PATH, report)
    }

    fn post_issue(&self, report: &IssueReport) -> Result<(), IngestError> {
        self.post(ISSUES_PATH, report)
    }

    fn post_status(&self, report: &StatusReport) -> Result<(), IngestError> {
        self.post(STATUS_PATH, report)
    }
}
