//! Deterministic simulation kernel for a fleet of battery-powered robots
//! sharing charging stations on a 2D grid.
//!
//! The kernel is single-threaded and tick-driven: each tick every vehicle
//! senses, decides, and moves in ascending id order, then the orchestrator
//! recomputes assignments, promotes queues, and arbitrates counter-proposals.
//! Given an identical [`contracts::ScenarioConfig`], two runs produce
//! identical per-tick snapshots.

pub mod assign;
pub mod behavior;
pub mod bus;
pub mod grid;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod reservation;
pub mod scenario;
pub mod vehicle;
pub mod world;

pub use grid::{ChargingStation, Grid};
pub use world::{ConfigError, FleetWorld};
