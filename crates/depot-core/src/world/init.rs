use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use contracts::{Coord, RunMode, RunStatus, ScenarioConfig, VehicleId, SCHEMA_VERSION_V1};

use super::{mix_hash, ActivityLog, FleetWorld};
use crate::bus::MessageBus;
use crate::grid::{Grid, GridError};
use crate::metrics::MetricsCollector;
use crate::orchestrator::Orchestrator;
use crate::planner;
use crate::reservation::ReservationTable;
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Grid(GridError),
    NoVehicles,
    NoStations,
    InvalidParam { name: &'static str, value: f64 },
    BatteryOutOfRange { vehicle: VehicleId, battery: f64 },
    StartNotWalkable { vehicle: VehicleId, coord: Coord },
    DuplicateStart { coord: Coord },
    UnreachableExit { from: Coord },
    UnreachableStation { station: Coord, from: Coord },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(err) => write!(f, "invalid grid: {err}"),
            Self::NoVehicles => write!(f, "scenario defines no vehicles"),
            Self::NoStations => write!(f, "scenario defines no charging stations"),
            Self::InvalidParam { name, value } => {
                write!(f, "parameter {name} has invalid value {value}")
            }
            Self::BatteryOutOfRange { vehicle, battery } => {
                write!(f, "vehicle {vehicle} battery {battery} outside [0, 100]")
            }
            Self::StartNotWalkable { vehicle, coord } => {
                write!(f, "vehicle {vehicle} starts on a non-walkable cell {coord}")
            }
            Self::DuplicateStart { coord } => {
                write!(f, "two vehicles share the start cell {coord}")
            }
            Self::UnreachableExit { from } => {
                write!(f, "exit is unreachable from {from}")
            }
            Self::UnreachableStation { station, from } => {
                write!(f, "station at {station} is unreachable from {from}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<GridError> for ConfigError {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

impl FleetWorld {
    /// Validates the scenario and builds the initial world. The world starts
    /// paused at tick zero.
    pub fn new(config: ScenarioConfig) -> Result<Self, ConfigError> {
        let params = config.params.clone();
        validate_param("drain_per_step", params.drain_per_step, 0.0, 100.0)?;
        validate_param("charge_per_step", params.charge_per_step, f64::MIN_POSITIVE, 100.0)?;
        validate_param("low_threshold", params.low_threshold, f64::MIN_POSITIVE, 100.0)?;
        validate_param("charge_target", params.charge_target, f64::MIN_POSITIVE, 100.0)?;
        validate_param("urgency_epsilon", params.urgency_epsilon, 0.0, 1.0)?;
        if params.max_steps == 0 {
            return Err(ConfigError::InvalidParam {
                name: "max_steps",
                value: 0.0,
            });
        }

        if config.vehicles.is_empty() {
            return Err(ConfigError::NoVehicles);
        }
        if config.stations.is_empty() {
            return Err(ConfigError::NoStations);
        }

        let (grid, stations) = Grid::from_ascii(&config.map, &config.stations, config.exit)?;

        let mut vehicles: BTreeMap<VehicleId, Vehicle> = BTreeMap::new();
        let mut seen_starts: BTreeSet<Coord> = BTreeSet::new();
        let empty = BTreeSet::new();
        for (index, spec) in config.vehicles.iter().enumerate() {
            let id = index as VehicleId;
            if !(0.0..=100.0).contains(&spec.battery) {
                return Err(ConfigError::BatteryOutOfRange {
                    vehicle: id,
                    battery: spec.battery,
                });
            }
            if !grid.is_walkable(spec.start) {
                return Err(ConfigError::StartNotWalkable {
                    vehicle: id,
                    coord: spec.start,
                });
            }
            if !seen_starts.insert(spec.start) {
                return Err(ConfigError::DuplicateStart { coord: spec.start });
            }
            if planner::plan(spec.start, grid.exit(), &grid, &empty).is_none() {
                return Err(ConfigError::UnreachableExit { from: spec.start });
            }
            for station in &stations {
                if planner::plan(spec.start, station.coord, &grid, &empty).is_none() {
                    return Err(ConfigError::UnreachableStation {
                        station: station.coord,
                        from: spec.start,
                    });
                }
            }
            vehicles.insert(id, Vehicle::new(id, spec.start, spec.battery, spec.behavior));
        }

        let status = RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config.run_id.clone(),
            current_tick: 0,
            max_steps: params.max_steps,
            mode: RunMode::Paused,
            outcome: None,
        };

        let state_hash = mix_hash(0x6b_u64, config.seed);

        Ok(Self {
            config,
            params,
            status,
            grid,
            stations,
            vehicles,
            reservations: ReservationTable::new(),
            bus: MessageBus::new(),
            orchestrator: Orchestrator::new(),
            metrics: MetricsCollector::new(),
            log: ActivityLog::default(),
            state_hash,
            stalled_ticks: 0,
        })
    }
}

fn validate_param(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::InvalidParam { name, value });
    }
    Ok(())
}
