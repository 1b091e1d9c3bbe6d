//! Persistence collaborators: upsert-or-create operations keyed by stable
//! string ids, plus an in-memory implementation.
//!
//! Session activation may be retried after a partial prior failure, so
//! every upsert must be idempotent.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::VehicleStatus;
use crate::model::SimVehicle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub project_id: String,
    pub task_id: String,
    pub vin: String,
    pub route_id: Option<String>,
    /// The session this run was provisioned for.
    pub session_id: String,
    pub status: RunStatus,
}

/// Vehicle registry entry: identity plus operational status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub vehicle: SimVehicle,
    pub status: VehicleStatus,
}

/// Persistence seam for vehicle/project/task/run provisioning.
pub trait FleetStore: Send + Sync {
    /// Create-or-update by VIN. A fresh record starts `Idle`; an existing
    /// record keeps its status and takes the latest attributes.
    fn upsert_vehicle(&self, vehicle: &SimVehicle) -> Result<(), StoreError>;
    fn upsert_project(&self, project: &ProjectRecord) -> Result<(), StoreError>;
    fn upsert_task(&self, task: &TaskRecord) -> Result<(), StoreError>;
    fn create_run(&self, run: &RunRecord) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryTables {
    vehicles: HashMap<String, VehicleRecord>,
    projects: HashMap<String, ProjectRecord>,
    tasks: HashMap<String, TaskRecord>,
    runs: HashMap<String, RunRecord>,
}

/// In-memory [`FleetStore`], usable as a default backend and as the test
/// double.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }

    pub fn vehicle_count(&self) -> usize {
        self.lock().map(|t| t.vehicles.len()).unwrap_or(0)
    }

    pub fn vehicle(&self, vin: &str) -> Option<VehicleRecord> {
        self.lock().ok()?.vehicles.get(vin).cloned()
    }

    pub fn project(&self, id: &str) -> Option<ProjectRecord> {
        self.lock().ok()?.projects.get(id).cloned()
    }

    pub fn task(&self, id: &str) -> Option<TaskRecord> {
        self.lock().ok()?.tasks.get(id).cloned()
    }

    pub fn runs_for_session(&self, session_id: &str) -> Vec<RunRecord> {
        let Ok(tables) = self.lock() else {
            return Vec::new();
        };
        let mut runs: Vec<RunRecord> = tables
            .runs
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.id.cmp(&b.id));
        runs
    }
}

impl FleetStore for MemoryStore {
    fn upsert_vehicle(&self, vehicle: &SimVehicle) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .vehicles
            .entry(vehicle.vin.clone())
            .and_modify(|record| record.vehicle = vehicle.clone())
            .or_insert_with(|| VehicleRecord {
                vehicle: vehicle.clone(),
                status: VehicleStatus::Idle,
            });
        Ok(())
    }

    fn upsert_project(&self, project: &ProjectRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    fn upsert_task(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn create_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(vin: &str, model_code: &str) -> SimVehicle {
        SimVehicle {
            vin: vin.into(),
            plate_type: "test".into(),
            model_code: model_code.into(),
            platform: "orin-x2".into(),
            soc: "soc-a".into(),
            sensor_suite: "suite-1".into(),
        }
    }

    #[test]
    fn upsert_vehicle_is_idempotent_by_vin() {
        let store = MemoryStore::new();
        store.upsert_vehicle(&vehicle("VIN1", "EV-M3")).expect("upsert");
        store.upsert_vehicle(&vehicle("VIN1", "EV-M5")).expect("upsert");

        assert_eq!(store.vehicle_count(), 1);
        let record = store.vehicle("VIN1").expect("present");
        assert_eq!(record.vehicle.model_code, "EV-M5");
        assert_eq!(record.status, VehicleStatus::Idle);
    }

    #[test]
    fn runs_filter_by_session() {
        let store = MemoryStore::new();
        for (id, session) in [("run-a", "s1"), ("run-b", "s1"), ("run-c", "s2")] {
            store
                .create_run(&RunRecord {
                    id: id.into(),
                    project_id: "p".into(),
                    task_id: "t".into(),
                    vin: "VIN1".into(),
                    route_id: None,
                    session_id: session.into(),
                    status: RunStatus::Active,
                })
                .expect("create run");
        }
        assert_eq!(store.runs_for_session("s1").len(), 2);
        assert_eq!(store.runs_for_session("s2").len(), 1);
        assert!(store.runs_for_session("s3").is_empty());
    }
}
