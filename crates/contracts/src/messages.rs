//! Message and state vocabulary shared by vehicles and the orchestrator.

use serde::{Deserialize, Serialize};

use crate::{Coord, StationId, VehicleId};

/// Vehicle lifecycle. `Completed` and `Stranded` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Idle,
    Waiting,
    Moving,
    Charging,
    Exiting,
    Completed,
    Stranded,
}

impl VehicleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stranded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Moving => "moving",
            Self::Charging => "charging",
            Self::Exiting => "exiting",
            Self::Completed => "completed",
            Self::Stranded => "stranded",
        }
    }
}

/// How a vehicle responds to assignments it considers suboptimal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Urgency-driven only: disputes when the battery is critically low.
    #[default]
    None,
    Cooperative,
    Competitive,
    TitForTat,
}

impl Behavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Cooperative => "cooperative",
            Self::Competitive => "competitive",
            Self::TitForTat => "tit_for_tat",
        }
    }
}

/// One observed move in the repeated assignment game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeerAction {
    Cooperate,
    Defect,
}

/// What a counter-proposal asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalTarget {
    /// A better slot in the same station's queue.
    QueuePosition(u32),
    /// A different station entirely.
    Station(StationId),
}

/// Everything that crosses the tick-local message bus. Delivery order within
/// an inbox is (sender id, emission order); see the bus implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    StatusUpdate {
        vehicle_id: VehicleId,
        coord: Coord,
        battery: f64,
        state: VehicleState,
        tick: u64,
    },
    Assignment {
        vehicle_id: VehicleId,
        station_id: StationId,
        station_coord: Coord,
        queue_pos: u32,
        priority: u32,
    },
    CounterProposal {
        vehicle_id: VehicleId,
        current_station: StationId,
        target: ProposalTarget,
        reason: String,
        urgency: f64,
    },
    /// Verdict on a counter-proposal. Sent to the proposer and to every other
    /// vehicle assigned to the contested station so behavioral layers can
    /// observe who disputed.
    AssignmentDecision {
        vehicle_id: VehicleId,
        accepted: bool,
        new_assignment: Option<(StationId, u32)>,
    },
}
