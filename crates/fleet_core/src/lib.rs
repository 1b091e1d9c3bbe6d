//! Fleet simulation engine: synthesizes a population of virtual vehicles
//! driving generated or road-snapped routes, continuously reporting
//! telemetry, status, and synthetic issues to an ingestion boundary, with
//! live start/pause/resume/stop control and aggregated statistics.

pub mod geo;
pub mod ingest;
pub mod model;
pub mod routing;
pub mod runner;
pub mod session;
pub mod spawner;
pub mod store;
pub mod synthetic;
