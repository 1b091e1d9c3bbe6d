//! Per-vehicle simulation actor: one runner drives one vehicle through one
//! route, continuously reporting synthetic state to the ingestion boundary,
//! independent of all other runners.
//!
//! Three timers run on their own threads, armed together by [`VehicleRunner::start`]
//! and disarmed together by `pause`/`stop`:
//!
//! 1. telemetry (fixed interval): advance the position cyclically and report
//!    position/speed/heading,
//! 2. issues (re-armed with a fresh uniform-random delay after each fire),
//! 3. mode switch (fixed interval): cycle the driving mode.
//!
//! Tick logic is plain methods; the timer threads only schedule. Network
//! failures are swallowed and show up solely as counters that do not
//! increment.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::geo::{bearing_deg, haversine_km, interpolate_route, GeoPoint};
use crate::ingest::{
    IngestError, IngestSink, IssueReport, StatusReport, TelemetryReport, VehicleStatus,
};
use crate::model::{DrivingMode, ReportConfig, SimVehicle};
use crate::synthetic;

/// Runner lifecycle phase. `Stopped` is terminal: a stopped runner is never
/// restarted, a new one is created instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Correlation identifiers a runner reports issues against.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub task_id: String,
    pub project_id: String,
}

/// Cumulative per-runner statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerStats {
    pub telemetry_sent: u64,
    pub issues_sent: u64,
    pub mileage_km: f64,
}

struct RunnerState {
    phase: RunnerPhase,
    /// Index into the interpolated path, always taken modulo its length.
    position: usize,
    mode: DrivingMode,
    stats: RunnerStats,
    rng: StdRng,
}

/// Cancellation latch shared by the three timer threads of one arming.
///
/// `pause`/`stop` cancel the gate; a new gate is created on every `start` so
/// a stale timer thread can never re-arm after the runner moved on.
struct TimerGate {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl TimerGate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        })
    }

    fn cancel(&self) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            *cancelled = true;
        }
        self.signal.notify_all();
    }

    /// Sleep for `interval`. Returns `false` if the gate was cancelled
    /// before the interval elapsed; poisoning counts as cancelled.
    fn sleep(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let Ok(mut cancelled) = self.cancelled.lock() else {
            return false;
        };
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match self.signal.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => cancelled = guard,
                Err(_) => return false,
            }
        }
        false
    }
}

/// One independent simulated-vehicle actor.
pub struct VehicleRunner {
    vehicle: SimVehicle,
    ctx: RunContext,
    report: ReportConfig,
    /// Dense path precomputed so one telemetry tick equals one path step.
    path: Vec<GeoPoint>,
    ingest: Arc<dyn IngestSink>,
    state: Mutex<RunnerState>,
    gate: Mutex<Option<Arc<TimerGate>>>,
}

impl VehicleRunner {
    /// Build a runner for one vehicle on one waypoint path.
    ///
    /// The path is interpolated once, at the arc length covered per
    /// telemetry interval at mid-range speed (see [`ReportConfig::step_km`]).
    pub fn new(
        vehicle: SimVehicle,
        waypoints: &[GeoPoint],
        report: ReportConfig,
        ctx: RunContext,
        ingest: Arc<dyn IngestSink>,
        seed: Option<u64>,
    ) -> Arc<Self> {
        let path = interpolate_route(waypoints, report.step_km());
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Arc::new(Self {
            vehicle,
            ctx,
            report,
            path,
            ingest,
            state: Mutex::new(RunnerState {
                phase: RunnerPhase::Idle,
                position: 0,
                mode: DrivingMode::Manual,
                stats: RunnerStats::default(),
                rng,
            }),
            gate: Mutex::new(None),
        })
    }

    pub fn vin(&self) -> &str {
        &self.vehicle.vin
    }

    pub fn phase(&self) -> RunnerPhase {
        self.state
            .lock()
            .map(|state| state.phase)
            .unwrap_or(RunnerPhase::Stopped)
    }

    /// Current (non-final) statistics snapshot.
    pub fn live_stats(&self) -> RunnerStats {
        self.state
            .lock()
            .map(|state| state.stats.clone())
            .unwrap_or_default()
    }

    /// Arm the three timers and send the initial `Active` status report.
    /// Transitions Idle/Paused to Running; a no-op on Running and Stopped.
    pub fn start(self: &Arc<Self>) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            match state.phase {
                RunnerPhase::Idle | RunnerPhase::Paused => state.phase = RunnerPhase::Running,
                RunnerPhase::Running | RunnerPhase::Stopped => return,
            }
        }

        let gate = TimerGate::new();
        if let Ok(mut slot) = self.gate.lock() {
            if let Some(stale) = slot.replace(Arc::clone(&gate)) {
                stale.cancel();
            }
        }

        let _ = self.send_status(VehicleStatus::Active);
        debug!(vin = %self.vehicle.vin, steps = self.path.len(), "runner started");

        let runner = Arc::clone(self);
        let telemetry_gate = Arc::clone(&gate);
        thread::spawn(move || {
            let interval = Duration::from_secs_f64(runner.report.telemetry_interval_s);
            while telemetry_gate.sleep(interval) {
                runner.telemetry_tick();
            }
        });

        let runner = Arc::clone(self);
        let issue_gate = Arc::clone(&gate);
        thread::spawn(move || loop {
            // Fresh random delay on every arming, never a fixed period.
            let delay = runner.next_issue_delay();
            if !issue_gate.sleep(delay) {
                break;
            }
            runner.issue_tick();
        });

        let runner = Arc::clone(self);
        thread::spawn(move || {
            let interval = Duration::from_secs_f64(runner.report.mode_switch_interval_s);
            while gate.sleep(interval) {
                runner.mode_tick();
            }
        });
    }

    /// Disarm all timers, keeping position, mode, and counters for a later
    /// `start`. No-op unless Running.
    pub fn pause(&self) {
        if let Ok(mut slot) = self.gate.lock() {
            if let Some(gate) = slot.take() {
                gate.cancel();
            }
        }
        if let Ok(mut state) = self.state.lock() {
            if state.phase == RunnerPhase::Running {
                state.phase = RunnerPhase::Paused;
            }
        }
    }

    /// Disarm all timers, send the final `Idle` status report, and return
    /// the cumulative statistics. Terminal; repeated calls return the same
    /// snapshot without further side effects.
    pub fn stop(&self) -> RunnerStats {
        if let Ok(mut slot) = self.gate.lock() {
            if let Some(gate) = slot.take() {
                gate.cancel();
            }
        }
        let snapshot = {
            let Ok(mut state) = self.state.lock() else {
                return RunnerStats::default();
            };
            if state.phase == RunnerPhase::Stopped {
                return state.stats.clone();
            }
            state.phase = RunnerPhase::Stopped;
            state.stats.clone()
        };
        let _ = self.send_status(VehicleStatus::Idle);
        debug!(vin = %self.vehicle.vin, mileage_km = snapshot.mileage_km, "runner stopped");
        snapshot
    }

    /// One telemetry tick: advance the position by one (cyclically), add
    /// the covered leg to mileage, and post a telemetry report.
    fn telemetry_tick(&self) {
        let report = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.phase != RunnerPhase::Running || self.path.is_empty() {
                return;
            }
            let prev = self.path[state.position];
            state.position = (state.position + 1) % self.path.len();
            let next = self.path[state.position];
            let leg_km = haversine_km(prev, next);
            state.stats.mileage_km += leg_km;
            let speed_mps = synthetic::sample_speed_mps(
                &mut state.rng,
                self.report.speed_min_kmh,
                self.report.speed_max_kmh,
            );
            TelemetryReport {
                vehicle_id: self.vehicle.vin.clone(),
                timestamp: Utc::now().timestamp_millis(),
                lat: next.lat,
                lng: next.lng,
                speed_mps,
                mileage_km: leg_km,
                driving_mode: state.mode,
                heading_deg: bearing_deg(prev, next),
            }
        };
        if self.ingest.post_telemetry(&report).is_ok() {
            if let Ok(mut state) = self.state.lock() {
                state.stats.telemetry_sent += 1;
            }
        }
    }

    /// One issue tick: synthesize a random issue at the current position.
    fn issue_tick(&self) {
        let report = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.phase != RunnerPhase::Running || self.path.is_empty() {
                return;
            }
            let at = self.path[state.position % self.path.len()];
            let before = self.path[(state.position + self.path.len() - 1) % self.path.len()];
            let draw = synthetic::sample_issue(&mut state.rng);
            let speed_mps = synthetic::sample_speed_mps(
                &mut state.rng,
                self.report.speed_min_kmh,
                self.report.speed_max_kmh,
            );
            let dynamics =
                synthetic::sample_dynamics(&mut state.rng, speed_mps, bearing_deg(before, at));
            IssueReport {
                run_id: self.ctx.run_id.clone(),
                project_id: self.ctx.project_id.clone(),
                task_id: self.ctx.task_id.clone(),
                trigger_timestamp: Utc::now().timestamp_millis(),
                gps_lat: at.lat,
                gps_lng: at.lng,
                category: draw.category,
                severity: draw.severity,
                takeover_type: draw.takeover_type,
                data_snapshot_uri: draw.data_snapshot_uri,
                environment_tags: vec![synthetic::ENVIRONMENT_TAG.to_string()],
                description: draw.description,
                vehicle_dynamics: dynamics,
            }
        };
        if self.ingest.post_issue(&report).is_ok() {
            if let Ok(mut state) = self.state.lock() {
                state.stats.issues_sent += 1;
            }
        }
    }

    /// One mode-switch tick: advance the driving mode one step in the fixed
    /// cyclic order.
    fn mode_tick(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.phase == RunnerPhase::Running {
                state.mode = state.mode.next();
            }
        }
    }

    fn next_issue_delay(&self) -> Duration {
        let min = self.report.issue_interval_min_s.max(0.0);
        let max = self.report.issue_interval_max_s.max(min);
        let secs = self
            .state
            .lock()
            .map(|mut state| state.rng.gen_range(min..=max))
            .unwrap_or(max);
        Duration::from_secs_f64(secs)
    }

    fn send_status(&self, status: VehicleStatus) -> Result<(), IngestError> {
        let report = {
            let Ok(mut state) = self.state.lock() else {
                return Ok(());
            };
            let at = self
                .path
                .get(state.position)
                .copied()
                .unwrap_or(GeoPoint::new(0.0, 0.0));
            StatusReport {
                vehicle_id: self.vehicle.vin.clone(),
                timestamp: Utc::now().timestamp_millis(),
                status,
                software_version: synthetic::sample_software_version(&mut state.rng),
                hardware_version: synthetic::sample_hardware_version(&mut state.rng),
                fuel_or_battery_level: synthetic::sample_battery_pct(&mut state.rng),
                driving_mode: state.mode,
                lat: at.lat,
                lng: at.lng,
            }
        };
        self.ingest.post_status(&report)
    }
}
