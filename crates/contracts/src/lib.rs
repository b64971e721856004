//! v1 cross-boundary contracts for the depot kernel, API, CLI, and observers.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod messages;
pub mod serde_u64_string;
pub mod snapshot;

pub use messages::{AgentMessage, Behavior, PeerAction, ProposalTarget, VehicleState};
pub use snapshot::{
    GridSnapshot, LogLevel, LogLine, MetricsSummary, Snapshot, StationMetricsRow, StationSnapshot,
    VehicleMetricsRow, VehicleOutcome, VehicleSnapshot,
};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Stable vehicle identifier. Ascending id order is the tie-break everywhere.
pub type VehicleId = u32;
/// Stable charging-station identifier.
pub type StationId = u32;

/// A grid cell coordinate. `x` grows east, `y` grows south (row index).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Coord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationSpec {
    pub coord: Coord,
    #[serde(default = "default_station_capacity")]
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSpec {
    pub start: Coord,
    pub battery: f64,
    #[serde(default)]
    pub behavior: Behavior,
}

/// Tunable simulation parameters. Every field has a default so scenario
/// files only spell out what they change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimParams {
    #[serde(default = "default_drain_per_step")]
    pub drain_per_step: f64,
    #[serde(default = "default_charge_per_step")]
    pub charge_per_step: f64,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
    #[serde(default = "default_charge_target")]
    pub charge_target: f64,
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
    #[serde(default = "default_battery_weight")]
    pub battery_weight: f64,
    #[serde(default = "default_load_weight")]
    pub load_weight: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Extra vehicles a station may queue beyond its capacity. `None` means
    /// unbounded queueing.
    #[serde(default)]
    pub queue_cap: Option<u32>,
    #[serde(default = "default_deadlock_ticks")]
    pub deadlock_ticks: u64,
    #[serde(default = "default_urgency_epsilon")]
    pub urgency_epsilon: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            drain_per_step: default_drain_per_step(),
            charge_per_step: default_charge_per_step(),
            low_threshold: default_low_threshold(),
            critical_threshold: default_critical_threshold(),
            charge_target: default_charge_target(),
            distance_weight: default_distance_weight(),
            battery_weight: default_battery_weight(),
            load_weight: default_load_weight(),
            max_steps: default_max_steps(),
            queue_cap: None,
            deadlock_ticks: default_deadlock_ticks(),
            urgency_epsilon: default_urgency_epsilon(),
        }
    }
}

fn default_station_capacity() -> u32 {
    1
}

fn default_drain_per_step() -> f64 {
    0.5
}

fn default_charge_per_step() -> f64 {
    2.0
}

fn default_low_threshold() -> f64 {
    30.0
}

fn default_critical_threshold() -> f64 {
    20.0
}

fn default_charge_target() -> f64 {
    95.0
}

fn default_distance_weight() -> f64 {
    1.0
}

fn default_battery_weight() -> f64 {
    2.0
}

fn default_load_weight() -> f64 {
    0.5
}

fn default_max_steps() -> u64 {
    1_000
}

fn default_deadlock_ticks() -> u64 {
    10
}

fn default_urgency_epsilon() -> f64 {
    0.05
}

/// A complete, self-contained scenario: grid, fleet, stations, parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    pub schema_version: String,
    pub run_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "serde_u64_string", default)]
    pub seed: u64,
    /// ASCII rows, `.` walkable and `#` obstacle. Stations and the exit are
    /// placed from the fields below, not from map characters.
    pub map: Vec<String>,
    pub stations: Vec<StationSpec>,
    pub exit: Coord,
    pub vehicles: Vec<VehicleSpec>,
    #[serde(default)]
    pub params: SimParams,
    /// Free-form oracle describing what a correct run looks like; used by
    /// tests and surfaced in the UI.
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

impl ScenarioConfig {
    pub fn width(&self) -> i32 {
        self.map.first().map(|row| row.len() as i32).unwrap_or(0)
    }

    pub fn height(&self) -> i32 {
        self.map.len() as i32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
}

/// How a finished run ended. Absent while the run is still live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every vehicle reached the exit.
    AllCompleted,
    /// Every vehicle is terminal but at least one stranded with a dead battery.
    SomeStranded,
    /// `max_steps` elapsed with non-terminal vehicles remaining.
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_tick: u64,
    pub max_steps: u64,
    pub mode: RunMode,
    pub outcome: Option<RunOutcome>,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} tick={}/{} mode={:?} outcome={:?}",
            self.run_id, self.current_tick, self.max_steps, self.mode, self.outcome
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    SimStart,
    SimPause,
    SimStepTick,
    SimRunToTick,
    SimReset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    SimStart,
    SimPause,
    SimStepTick { steps: u64 },
    SimRunToTick { target_tick: u64 },
    SimReset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub issued_at_tick: u64,
    pub command_type: CommandType,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(
        command_id: impl Into<String>,
        run_id: impl Into<String>,
        issued_at_tick: u64,
        command_type: CommandType,
        payload: CommandPayload,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command_id.into(),
            run_id: run_id.into(),
            issued_at_tick,
            command_type,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RunNotFound,
    ScenarioUnknown,
    InvalidCommand,
    InvalidQuery,
    InvalidConfig,
    TickOutOfRange,
    ContractVersionUnsupported,
    RunStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub accepted: bool,
    pub error: Option<ApiError>,
}

impl CommandResult {
    pub fn accepted(command: &Command) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(command: &Command, error: ApiError) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: false,
            error: Some(error),
        }
    }
}
