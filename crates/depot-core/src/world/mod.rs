//! The stepping model: exclusive owner of the grid, stations, vehicles,
//! reservation table, and message bus, composed into a deterministic tick
//! loop.

use std::collections::{BTreeMap, VecDeque};

mod init;
mod snapshot;
mod step;

#[cfg(test)]
mod tests;

pub use init::ConfigError;

use contracts::{LogLevel, LogLine, RunStatus, ScenarioConfig, SimParams, VehicleId};

use crate::bus::MessageBus;
use crate::grid::{ChargingStation, Grid};
use crate::metrics::MetricsCollector;
use crate::orchestrator::Orchestrator;
use crate::reservation::ReservationTable;
use crate::vehicle::Vehicle;

const RECENT_LOG_LINES: usize = 64;

/// Bounded, deterministic activity stream surfaced through snapshots.
#[derive(Debug, Default)]
pub struct ActivityLog {
    recent: VecDeque<LogLine>,
    total: u64,
}

impl ActivityLog {
    pub fn push(
        &mut self,
        tick: u64,
        source: String,
        level: LogLevel,
        message: String,
    ) {
        self.recent.push_back(LogLine {
            tick,
            source,
            level,
            message,
        });
        if self.recent.len() > RECENT_LOG_LINES {
            self.recent.pop_front();
        }
        self.total += 1;
    }

    pub fn info(&mut self, tick: u64, source: String, message: String) {
        self.push(tick, source, LogLevel::Info, message);
    }

    pub fn action(&mut self, tick: u64, source: String, message: String) {
        self.push(tick, source, LogLevel::Action, message);
    }

    pub fn warning(&mut self, tick: u64, source: String, message: String) {
        self.push(tick, source, LogLevel::Warning, message);
    }

    pub fn error(&mut self, tick: u64, source: String, message: String) {
        self.push(tick, source, LogLevel::Error, message);
    }

    pub fn recent(&self) -> Vec<LogLine> {
        self.recent.iter().cloned().collect()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[derive(Debug)]
pub struct FleetWorld {
    config: ScenarioConfig,
    params: SimParams,
    status: RunStatus,
    grid: Grid,
    stations: Vec<ChargingStation>,
    vehicles: BTreeMap<VehicleId, Vehicle>,
    reservations: ReservationTable,
    bus: MessageBus,
    orchestrator: Orchestrator,
    metrics: MetricsCollector,
    log: ActivityLog,
    state_hash: u64,
    /// Consecutive ticks without movement or orchestrator changes.
    stalled_ticks: u64,
}

impl FleetWorld {
    pub fn run_id(&self) -> &str {
        &self.status.run_id
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn stations(&self) -> &[ChargingStation] {
        &self.stations
    }

    pub fn state_hash(&self) -> u64 {
        self.state_hash
    }

    #[cfg(test)]
    pub(crate) fn vehicles(&self) -> &BTreeMap<VehicleId, Vehicle> {
        &self.vehicles
    }

    #[cfg(test)]
    pub(crate) fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }
}

pub(crate) fn mix_hash(hash: u64, value: u64) -> u64 {
    let mut mixed = hash ^ value.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    mixed = mixed.rotate_left(17);
    mixed.wrapping_mul(0x517C_C1B7_2722_0A95)
}

pub(crate) fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}
