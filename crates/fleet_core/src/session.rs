//! Session orchestration: activates a configured simulation session into a
//! set of live vehicle runners and manages their shared lifecycle.
//!
//! Activation resolves the fleet and routes (generating either on demand),
//! provisions project/task/run records through the persistence seam, then
//! arms one [`VehicleRunner`] per run. At most one activation per session id
//! is live at a time; `start` on an already-active session resumes its
//! paused runners instead of provisioning a second fleet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{info, warn};

use crate::geo::GeoPoint;
use crate::ingest::IngestSink;
use crate::model::{ResolveMode, RoadRoute, SessionStats, SimVehicle, SimulationSession};
use crate::routing::RoadRouter;
use crate::runner::{RunContext, VehicleRunner};
use crate::spawner::{self, RouteGenParams};
use crate::store::{FleetStore, ProjectRecord, RunRecord, RunStatus, StoreError, TaskRecord};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session provisioning failed: {0}")]
    Store(#[from] StoreError),
}

/// Point-in-time statistics for an active session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveStats {
    pub telemetry_sent: u64,
    pub issues_sent: u64,
    pub total_mileage_km: f64,
    pub vehicle_count: usize,
}

struct ActiveSession {
    runners: Vec<Arc<VehicleRunner>>,
}

/// One runner's worth of resolved configuration, persisted as a run record.
struct ProvisionedRun {
    vehicle: SimVehicle,
    points: Vec<GeoPoint>,
    ctx: RunContext,
}

/// Entry point for session control: start, pause, stop, and live statistics.
pub struct SessionController {
    store: Arc<dyn FleetStore>,
    ingest: Arc<dyn IngestSink>,
    router: Option<Arc<RoadRouter>>,
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionController {
    pub fn new(store: Arc<dyn FleetStore>, ingest: Arc<dyn IngestSink>) -> Self {
        Self {
            store,
            ingest,
            router: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a road router so routes flagged `snap_to_roads` are snapped
    /// during activation.
    pub fn with_router(mut self, router: Arc<RoadRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Activate a session, or resume it when it is already active.
    ///
    /// First activation resolves vehicles and routes, provisions records,
    /// and starts one runner per run. On an already-active session this
    /// re-arms paused runners and provisions nothing.
    pub fn start(&self, session: &SimulationSession) -> Result<(), SessionError> {
        let existing = self
            .registry()
            .get(&session.id)
            .map(|active| active.runners.clone());
        if let Some(runners) = existing {
            for runner in &runners {
                runner.start();
            }
            info!(session = %session.id, "session already active, resumed runners");
            return Ok(());
        }

        let mut rng = match session.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let vehicles = self.resolve_vehicles(session, &mut rng)?;
        let routes = self.resolve_routes(session, vehicles.len(), &mut rng);
        let runs = self.provision_runs(session, vehicles, &routes)?;

        let runners: Vec<Arc<VehicleRunner>> = runs
            .into_iter()
            .enumerate()
            .map(|(idx, run)| {
                // Distinct derived seed per runner keeps replays deterministic
                // without every runner sampling identical sequences.
                let seed = session.seed.map(|s| s.wrapping_add(idx as u64 + 1));
                VehicleRunner::new(
                    run.vehicle,
                    &run.points,
                    session.report.clone(),
                    run.ctx,
                    Arc::clone(&self.ingest),
                    seed,
                )
            })
            .collect();

        {
            let mut registry = self.registry();
            if registry.contains_key(&session.id) {
                // Lost the activation race; the winner's runners are live.
                return Ok(());
            }
            registry.insert(
                session.id.clone(),
                ActiveSession {
                    runners: runners.clone(),
                },
            );
        }

        for runner in &runners {
            runner.start();
        }
        info!(session = %session.id, runners = runners.len(), "session started");
        Ok(())
    }

    /// Pause all runners of an active session, keeping it registered so a
    /// later `start` resumes it. Returns `false` for unknown session ids.
    pub fn pause(&self, session_id: &str) -> bool {
        let Some(runners) = self
            .registry()
            .get(session_id)
            .map(|active| active.runners.clone())
        else {
            return false;
        };
        for runner in &runners {
            runner.pause();
        }
        info!(session = %session_id, "session paused");
        true
    }

    /// Stop and unregister a session, returning its aggregated final
    /// statistics. `None` when the session is not active (including a
    /// second stop).
    pub fn stop(&self, session_id: &str) -> Option<SessionStats> {
        let active = self.registry().remove(session_id)?;
        let mut totals = SessionStats::default();
        for runner in &active.runners {
            let stats = runner.stop();
            totals.telemetry_sent += stats.telemetry_sent;
            totals.issues_sent += stats.issues_sent;
            totals.total_mileage_km += stats.mileage_km;
        }
        info!(
            session = %session_id,
            telemetry = totals.telemetry_sent,
            issues = totals.issues_sent,
            mileage_km = totals.total_mileage_km,
            "session stopped",
        );
        Some(totals)
    }

    /// Aggregate live statistics across the runners of an active session.
    pub fn live_stats(&self, session_id: &str) -> Option<LiveStats> {
        let runners = self
            .registry()
            .get(session_id)
            .map(|active| active.runners.clone())?;
        let mut live = LiveStats {
            vehicle_count: runners.len(),
            ..LiveStats::default()
        };
        for runner in &runners {
            let stats = runner.live_stats();
            live.telemetry_sent += stats.telemetry_sent;
            live.issues_sent += stats.issues_sent;
            live.total_mileage_km += stats.mileage_km;
        }
        Some(live)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_vehicles(
        &self,
        session: &SimulationSession,
        rng: &mut StdRng,
    ) -> Result<Vec<SimVehicle>, SessionError> {
        let fleet = &session.fleet;
        let vehicles = if fleet.mode == ResolveMode::Custom && !fleet.vehicles.is_empty() {
            fleet.vehicles.clone()
        } else {
            spawner::generate_fleet(rng, fleet.vehicle_count.max(1), fleet.template.as_ref())
        };
        for vehicle in &vehicles {
            self.store.upsert_vehicle(vehicle)?;
        }
        Ok(vehicles)
    }

    fn resolve_routes(
        &self,
        session: &SimulationSession,
        fleet_size: usize,
        rng: &mut StdRng,
    ) -> Vec<RoadRoute> {
        let config = &session.routes;
        let routes = if config.mode == ResolveMode::Custom && !config.routes.is_empty() {
            config.routes.clone()
        } else {
            spawner::generate_routes(
                rng,
                &RouteGenParams {
                    start_point: config.start_point,
                    radius_km: config.radius_km,
                    count: fleet_size.max(1),
                    min_waypoints: config.min_waypoints,
                    max_waypoints: config.max_waypoints,
                    target_distance_km: None,
                },
            )
        };
        match &self.router {
            Some(router) if config.snap_to_roads => router.snap_routes_to_roads(routes),
            _ => routes,
        }
    }

    /// Persist one run record per runner and pair each vehicle with its
    /// route. Explicit assignments bind by VIN and route id; otherwise a
    /// project and task are provisioned for the session and routes are
    /// dealt round-robin.
    fn provision_runs(
        &self,
        session: &SimulationSession,
        vehicles: Vec<SimVehicle>,
        routes: &[RoadRoute],
    ) -> Result<Vec<ProvisionedRun>, SessionError> {
        let mut runs = Vec::new();

        if !session.assignments.is_empty() {
            for (idx, assignment) in session.assignments.iter().enumerate() {
                let Some(vehicle) = vehicles.iter().find(|v| v.vin == assignment.vin) else {
                    warn!(session = %session.id, vin = %assignment.vin,
                        "assignment references unknown vehicle, skipping");
                    continue;
                };
                let route = assignment
                    .route_id
                    .as_deref()
                    .and_then(|id| routes.iter().find(|r| r.id == id))
                    .or_else(|| routes.get(idx % routes.len().max(1)));
                self.push_run(
                    session,
                    &mut runs,
                    vehicle.clone(),
                    route,
                    &assignment.project_id,
                    &assignment.task_id,
                )?;
            }
            return Ok(runs);
        }

        let project = ProjectRecord {
            id: format!("{}-project", session.id),
            name: format!("{} project", session.name),
        };
        self.store.upsert_project(&project)?;
        let task = TaskRecord {
            id: format!("{}-task", session.id),
            project_id: project.id.clone(),
            name: format!("{} task", session.name),
        };
        self.store.upsert_task(&task)?;

        for (idx, vehicle) in vehicles.into_iter().enumerate() {
            let route = routes.get(idx % routes.len().max(1));
            self.push_run(session, &mut runs, vehicle, route, &project.id, &task.id)?;
        }
        Ok(runs)
    }

    fn push_run(
        &self,
        session: &SimulationSession,
        runs: &mut Vec<ProvisionedRun>,
        vehicle: SimVehicle,
        route: Option<&RoadRoute>,
        project_id: &str,
        task_id: &str,
    ) -> Result<(), SessionError> {
        let run_id = format!("{}-run-{:03}", session.id, runs.len());
        self.store.create_run(&RunRecord {
            id: run_id.clone(),
            project_id: project_id.to_string(),
            task_id: task_id.to_string(),
            vin: vehicle.vin.clone(),
            route_id: route.map(|r| r.id.clone()),
            session_id: session.id.clone(),
            status: RunStatus::Active,
        })?;
        runs.push(ProvisionedRun {
            vehicle,
            points: route.map(|r| r.drive_points().to_vec()).unwrap_or_default(),
            ctx: RunContext {
                run_id,
                task_id: task_id.to_string(),
                project_id: project_id.to_string(),
            },
        });
        Ok(())
    }
}
