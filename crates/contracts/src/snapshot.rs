//! Read-only, tick-aligned views of the simulation for external observers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Behavior, Coord, StationId, VehicleId, VehicleState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Action,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogLine {
    pub tick: u64,
    pub source: String,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleOutcome {
    Completed,
    Stranded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleMetricsRow {
    pub vehicle_id: VehicleId,
    pub distance_traveled: u64,
    pub ticks_charging: u64,
    pub ticks_waiting: u64,
    pub replans: u64,
    pub yields: u64,
    pub outcome: Option<VehicleOutcome>,
    pub ticks_to_complete: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationMetricsRow {
    pub station_id: StationId,
    pub occupied_ticks: u64,
    pub utilization: f64,
    pub peak_queue: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub vehicles: Vec<VehicleMetricsRow>,
    pub stations: Vec<StationMetricsRow>,
    pub yields_averted: u64,
    pub counter_proposals: u64,
    pub proposals_accepted: u64,
    pub proposals_rejected: u64,
    pub accepts_by_behavior: BTreeMap<String, u64>,
    pub disputes_by_behavior: BTreeMap<String, u64>,
    /// Jain index over ticks-to-complete of completed vehicles; `None` until
    /// at least one vehicle completes.
    pub fairness_index: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridSnapshot {
    pub width: i32,
    pub height: i32,
    pub obstacles: Vec<Coord>,
    pub exit: Coord,
    /// ASCII render with vehicles overlaid, one row per line.
    pub render: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub coord: Coord,
    pub battery: f64,
    pub state: VehicleState,
    pub behavior: Behavior,
    /// Remaining planned cells, next cell first.
    pub path_remainder: Vec<Coord>,
    /// Last few distinct cells visited, oldest first.
    pub trail: Vec<Coord>,
    pub station_id: Option<StationId>,
    pub queue_pos: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationSnapshot {
    pub id: StationId,
    pub coord: Coord,
    pub capacity: u32,
    pub occupants: Vec<VehicleId>,
    pub queue: Vec<VehicleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub tick: u64,
    pub snapshot_id: String,
    pub world_state_hash: String,
    pub grid: GridSnapshot,
    pub vehicles: Vec<VehicleSnapshot>,
    pub stations: Vec<StationSnapshot>,
    pub recent_log: Vec<LogLine>,
    pub metrics: MetricsSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SCHEMA_VERSION_V1;

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_t".to_string(),
            tick: 12,
            snapshot_id: "snap_000012".to_string(),
            world_state_hash: "00ff00ff00ff00ff".to_string(),
            grid: GridSnapshot {
                width: 4,
                height: 2,
                obstacles: vec![Coord::new(1, 0)],
                exit: Coord::new(0, 1),
                render: vec![".#..".to_string(), "E...".to_string()],
            },
            vehicles: vec![VehicleSnapshot {
                id: 0,
                coord: Coord::new(3, 1),
                battery: 44.5,
                state: VehicleState::Moving,
                behavior: Behavior::None,
                path_remainder: vec![Coord::new(2, 1)],
                trail: vec![Coord::new(3, 0), Coord::new(3, 1)],
                station_id: Some(0),
                queue_pos: Some(0),
            }],
            stations: vec![StationSnapshot {
                id: 0,
                coord: Coord::new(2, 0),
                capacity: 1,
                occupants: vec![],
                queue: vec![],
            }],
            recent_log: vec![LogLine {
                tick: 12,
                source: "vehicle_0".to_string(),
                level: LogLevel::Action,
                message: "planned path to station 0 (2 steps)".to_string(),
            }],
            metrics: MetricsSummary {
                total_ticks: 12,
                vehicles: vec![],
                stations: vec![],
                yields_averted: 0,
                counter_proposals: 0,
                proposals_accepted: 0,
                proposals_rejected: 0,
                accepts_by_behavior: BTreeMap::new(),
                disputes_by_behavior: BTreeMap::new(),
                fairness_index: None,
            },
        };

        let text = serde_json::to_string(&snapshot).expect("serialize");
        let decoded: Snapshot = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(decoded, snapshot);
    }
}
