use std::collections::BTreeMap;

use contracts::{RunMode, RunOutcome, VehicleId, VehicleState};

use super::{mix_hash, mix_seed, FleetWorld};
use crate::orchestrator::{OrchestratorCtx, RosterEntry};
use crate::vehicle::VehicleCtx;

impl FleetWorld {
    pub fn start(&mut self) {
        if !self.status.is_complete() {
            self.status.mode = RunMode::Running;
        }
    }

    pub fn pause(&mut self) {
        self.status.mode = RunMode::Paused;
    }

    /// Advances the simulation by one tick. Returns `false` without touching
    /// any state once the run has finished.
    ///
    /// Tick order: reservation gc, vehicles in ascending id, orchestrator,
    /// metrics, tick increment, deadlock check, termination check.
    pub fn step_tick(&mut self) -> bool {
        if self.status.is_complete() {
            self.status.mode = RunMode::Paused;
            return false;
        }
        self.status.mode = RunMode::Running;
        let tick = self.status.current_tick;

        self.reservations.gc(tick);

        let mut moved = false;
        let ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        for id in ids {
            let Some(mut vehicle) = self.vehicles.remove(&id) else {
                continue;
            };
            {
                let mut ctx = VehicleCtx {
                    tick,
                    params: &self.params,
                    grid: &self.grid,
                    stations: &self.stations,
                    others: &self.vehicles,
                    reservations: &mut self.reservations,
                    bus: &mut self.bus,
                    metrics: &mut self.metrics,
                    log: &mut self.log,
                    moved: &mut moved,
                };
                vehicle.step(&mut ctx);
            }
            self.vehicles.insert(id, vehicle);
        }

        let roster: BTreeMap<VehicleId, RosterEntry> = self
            .vehicles
            .iter()
            .map(|(&id, vehicle)| {
                (
                    id,
                    RosterEntry {
                        coord: vehicle.coord,
                        battery: vehicle.battery,
                        state: vehicle.state,
                    },
                )
            })
            .collect();

        let mut progressed = moved;
        {
            let mut ctx = OrchestratorCtx {
                tick,
                params: &self.params,
                stations: &mut self.stations,
                roster: &roster,
                bus: &mut self.bus,
                metrics: &mut self.metrics,
                log: &mut self.log,
                progressed: &mut progressed,
            };
            self.orchestrator.step(&mut ctx);
        }

        self.metrics.collect(&self.stations);
        self.fold_state_hash(tick);
        self.status.current_tick = tick + 1;

        if progressed {
            self.stalled_ticks = 0;
        } else {
            self.stalled_ticks += 1;
            if self.stalled_ticks >= self.params.deadlock_ticks {
                self.escape_deadlock(tick);
                self.stalled_ticks = 0;
            }
        }

        self.check_termination();
        true
    }

    pub fn step_n(&mut self, n: u64) -> u64 {
        let mut committed = 0_u64;
        for _ in 0..n {
            if !self.step_tick() {
                break;
            }
            committed += 1;
        }
        committed
    }

    pub fn run_to_tick(&mut self, tick: u64) -> u64 {
        let mut committed = 0_u64;
        while self.status.current_tick < tick {
            if !self.step_tick() {
                break;
            }
            committed += 1;
        }
        committed
    }

    /// Runs until every vehicle is terminal or the step cap is hit.
    pub fn run_until_complete(&mut self) -> u64 {
        let mut committed = 0_u64;
        while self.step_tick() {
            committed += 1;
        }
        committed
    }

    /// No vehicle moved and no orchestrator state changed for
    /// `deadlock_ticks` in a row: force replanning on a seeded subset of the
    /// live vehicles to break the symmetry.
    fn escape_deadlock(&mut self, tick: u64) {
        self.log.warning(
            tick,
            "world".to_string(),
            format!(
                "no progress for {} ticks, forcing replans",
                self.params.deadlock_ticks
            ),
        );

        let live: Vec<VehicleId> = self
            .vehicles
            .values()
            .filter(|vehicle| !vehicle.state.is_terminal())
            .map(|vehicle| vehicle.id)
            .collect();
        let picked: Vec<VehicleId> = live
            .iter()
            .copied()
            .filter(|&id| mix_seed(self.config.seed ^ tick, u64::from(id)) & 1 == 0)
            .collect();
        let targets = if picked.is_empty() { live } else { picked };

        for id in targets {
            if let Some(vehicle) = self.vehicles.get_mut(&id) {
                vehicle.force_replan = true;
            }
            self.reservations.clear_vehicle(id);
        }
    }

    fn check_termination(&mut self) {
        let all_terminal = self
            .vehicles
            .values()
            .all(|vehicle| vehicle.state.is_terminal());

        if all_terminal {
            let all_completed = self
                .vehicles
                .values()
                .all(|vehicle| vehicle.state == VehicleState::Completed);
            self.status.outcome = Some(if all_completed {
                RunOutcome::AllCompleted
            } else {
                RunOutcome::SomeStranded
            });
            self.status.mode = RunMode::Paused;
            return;
        }

        if self.status.current_tick >= self.params.max_steps {
            let unfinished = self
                .vehicles
                .values()
                .filter(|vehicle| !vehicle.state.is_terminal())
                .count();
            self.log.warning(
                self.status.current_tick,
                "world".to_string(),
                format!("timed out at step cap with {unfinished} unfinished vehicle(s)"),
            );
            self.status.outcome = Some(RunOutcome::TimedOut);
            self.status.mode = RunMode::Paused;
        }
    }

    /// Folds the tick's observable state into the running hash; two runs of
    /// the same scenario produce identical hash sequences.
    fn fold_state_hash(&mut self, tick: u64) {
        let mut hash = mix_hash(self.state_hash, tick);
        for vehicle in self.vehicles.values() {
            hash = mix_hash(hash, u64::from(vehicle.id));
            hash = mix_hash(hash, vehicle.coord.x as u64);
            hash = mix_hash(hash, vehicle.coord.y as u64);
            hash = mix_hash(hash, vehicle.battery.to_bits());
            hash = mix_hash(hash, vehicle.state as u64);
        }
        for station in &self.stations {
            hash = mix_hash(hash, u64::from(station.id));
            for &occupant in &station.occupants {
                hash = mix_hash(hash, 0x0CC0 ^ u64::from(occupant));
            }
            for &queued in &station.queue {
                hash = mix_hash(hash, 0x0E0E ^ u64::from(queued));
            }
        }
        self.state_hash = hash;
    }
}
