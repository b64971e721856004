//! Per-robot state machine: sense, plan, move, charge.
//!
//! Vehicles step in ascending id order. Each step drains battery, reports
//! status, ingests orchestrator messages, performs the state-dependent
//! action under the collision rules, and refreshes reservations.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use contracts::{
    AgentMessage, Behavior, Coord, PeerAction, ProposalTarget, SimParams, StationId, VehicleId,
    VehicleState,
};

use crate::behavior::{self, Decision};
use crate::bus::{Address, MessageBus};
use crate::grid::{ChargingStation, Grid};
use crate::metrics::MetricsCollector;
use crate::reservation::ReservationTable;
use crate::world::ActivityLog;

const TRAIL_LEN: usize = 10;
/// Consecutive yields before a forced replan around the blockers.
const YIELDS_BEFORE_REPLAN: u32 = 3;
/// Consecutive failed plans before the vehicle is declared stranded.
const NO_PATH_LIMIT: u32 = 3;

/// Everything a vehicle may touch during its step slot. The world constructs
/// this view; vehicles never hold references to stations or to each other.
pub struct VehicleCtx<'a> {
    pub tick: u64,
    pub params: &'a SimParams,
    pub grid: &'a Grid,
    pub stations: &'a [ChargingStation],
    pub others: &'a BTreeMap<VehicleId, Vehicle>,
    pub reservations: &'a mut ReservationTable,
    pub bus: &'a mut MessageBus,
    pub metrics: &'a mut MetricsCollector,
    pub log: &'a mut ActivityLog,
    /// Set when this vehicle moves or charges; feeds deadlock detection.
    pub moved: &'a mut bool,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub coord: Coord,
    pub battery: f64,
    pub state: VehicleState,
    pub behavior: Behavior,
    /// Remaining planned cells, next cell first. Excludes the current cell.
    pub path: VecDeque<Coord>,
    pub assigned_station: Option<StationId>,
    pub assigned_coord: Option<Coord>,
    pub queue_pos: Option<u32>,
    /// Current movement target: station cell, waiting cell, or exit.
    pub goal: Option<Coord>,
    pub yields_in_a_row: u32,
    pub no_path_streak: u32,
    pub ticks_waiting: u64,
    pub peer_history: BTreeMap<VehicleId, Vec<PeerAction>>,
    pub self_history: BTreeMap<VehicleId, Vec<PeerAction>>,
    pub trail: VecDeque<Coord>,
    pub completed_tick: Option<u64>,
    /// Set by the deadlock escape hatch; forces a fresh plan this step.
    pub force_replan: bool,
}

impl Vehicle {
    pub fn new(id: VehicleId, start: Coord, battery: f64, behavior: Behavior) -> Self {
        let mut trail = VecDeque::new();
        trail.push_back(start);
        Self {
            id,
            coord: start,
            battery: battery.clamp(0.0, 100.0),
            state: VehicleState::Idle,
            behavior,
            path: VecDeque::new(),
            assigned_station: None,
            assigned_coord: None,
            queue_pos: None,
            goal: None,
            yields_in_a_row: 0,
            no_path_streak: 0,
            ticks_waiting: 0,
            peer_history: BTreeMap::new(),
            self_history: BTreeMap::new(),
            trail,
            completed_tick: None,
            force_replan: false,
        }
    }

    fn source(&self) -> String {
        format!("vehicle_{}", self.id)
    }

    pub fn step(&mut self, ctx: &mut VehicleCtx<'_>) {
        if self.state.is_terminal() {
            return;
        }

        if self.state != VehicleState::Charging {
            self.battery = (self.battery - ctx.params.drain_per_step).max(0.0);
            if self.battery <= 0.0 {
                self.strand(ctx, "battery depleted");
                self.emit_status(ctx);
                return;
            }
        }

        if self.state == VehicleState::Idle && self.battery <= ctx.params.low_threshold {
            self.state = VehicleState::Waiting;
            ctx.log.action(
                ctx.tick,
                self.source(),
                format!("battery low ({:.1}%), requesting charging", self.battery),
            );
        }

        self.emit_status(ctx);
        self.ingest_messages(ctx);

        if self.force_replan {
            self.force_replan = false;
            if self.goal.is_some() {
                self.replan(ctx, &BTreeSet::new());
            }
        }

        match self.state {
            VehicleState::Idle => {}
            VehicleState::Waiting => {
                self.ticks_waiting += 1;
                ctx.metrics.record_waiting_tick(self.id);
            }
            VehicleState::Moving | VehicleState::Exiting => self.advance(ctx),
            VehicleState::Charging => self.charge(ctx),
            VehicleState::Completed | VehicleState::Stranded => return,
        }

        self.refresh_reservations(ctx);
    }

    fn emit_status(&self, ctx: &mut VehicleCtx<'_>) {
        ctx.bus.send(
            Address::Vehicle(self.id),
            Address::Orchestrator,
            AgentMessage::StatusUpdate {
                vehicle_id: self.id,
                coord: self.coord,
                battery: self.battery,
                state: self.state,
                tick: ctx.tick,
            },
        );
    }

    fn ingest_messages(&mut self, ctx: &mut VehicleCtx<'_>) {
        for message in ctx.bus.drain(Address::Vehicle(self.id)) {
            match message {
                AgentMessage::Assignment {
                    station_id,
                    station_coord,
                    queue_pos,
                    ..
                } => self.apply_assignment(ctx, station_id, station_coord, queue_pos),
                AgentMessage::AssignmentDecision {
                    vehicle_id,
                    accepted,
                    new_assignment,
                } => self.apply_decision(ctx, vehicle_id, accepted, new_assignment),
                // Vehicles never receive the other variants.
                _ => {}
            }
        }
    }

    /// The queue member one slot ahead, resolved through the world's view of
    /// all vehicles. `None` for the queue head or a sole contender.
    fn find_opponent(
        &self,
        ctx: &VehicleCtx<'_>,
        station_id: StationId,
        queue_pos: u32,
    ) -> Option<VehicleId> {
        if queue_pos == 0 {
            return None;
        }
        let ahead = queue_pos - 1;
        ctx.others
            .values()
            .filter(|other| {
                !other.state.is_terminal()
                    && other.assigned_station == Some(station_id)
                    && other.queue_pos == Some(ahead)
            })
            .map(|other| other.id)
            .min()
    }

    fn apply_assignment(
        &mut self,
        ctx: &mut VehicleCtx<'_>,
        station_id: StationId,
        station_coord: Coord,
        queue_pos: u32,
    ) {
        if self.state.is_terminal() || self.state == VehicleState::Charging {
            return;
        }

        self.assigned_station = Some(station_id);
        self.assigned_coord = Some(station_coord);
        self.queue_pos = Some(queue_pos);
        ctx.log.info(
            ctx.tick,
            self.source(),
            format!("assigned station {station_id} at queue position {queue_pos}"),
        );

        let opponent = self.find_opponent(ctx, station_id, queue_pos);
        let decision = behavior::decide(
            self.behavior,
            queue_pos,
            self.battery,
            ctx.params.critical_threshold,
            opponent,
            &self.peer_history,
        );
        if queue_pos > 0 {
            ctx.metrics
                .record_decision(self.behavior, decision == Decision::Dispute);
        }

        match decision {
            Decision::Dispute => {
                self.send_counter_proposal(ctx, station_id, queue_pos, opponent);
            }
            Decision::Accept => {
                if let Some(opponent) = opponent {
                    self.self_history
                        .entry(opponent)
                        .or_default()
                        .push(PeerAction::Cooperate);
                }
            }
        }

        self.retarget(ctx, station_coord, queue_pos);
    }

    fn send_counter_proposal(
        &mut self,
        ctx: &mut VehicleCtx<'_>,
        station_id: StationId,
        queue_pos: u32,
        opponent: Option<VehicleId>,
    ) {
        let critical = self.battery < ctx.params.critical_threshold;
        let target_pos = if critical { 0 } else { queue_pos.saturating_sub(1) };
        let reason = match self.behavior {
            Behavior::Competitive => "demand_priority",
            Behavior::TitForTat => "retaliation",
            _ if critical => "critical_battery",
            _ => "earlier_position",
        };
        let urgency = urgency_score(self.battery, self.ticks_waiting, ctx.params);

        ctx.bus.send(
            Address::Vehicle(self.id),
            Address::Orchestrator,
            AgentMessage::CounterProposal {
                vehicle_id: self.id,
                current_station: station_id,
                target: ProposalTarget::QueuePosition(target_pos),
                reason: reason.to_string(),
                urgency,
            },
        );
        ctx.metrics.record_counter_proposal();
        if let Some(opponent) = opponent {
            self.self_history
                .entry(opponent)
                .or_default()
                .push(PeerAction::Defect);
        }
        ctx.log.action(
            ctx.tick,
            self.source(),
            format!(
                "disputes queue position {queue_pos} at station {station_id} ({reason}, urgency {urgency:.2})"
            ),
        );
    }

    fn apply_decision(
        &mut self,
        ctx: &mut VehicleCtx<'_>,
        proposer: VehicleId,
        accepted: bool,
        new_assignment: Option<(StationId, u32)>,
    ) {
        if proposer != self.id {
            // Someone contested the ordering at our station: a defection,
            // whether or not the orchestrator granted it.
            self.peer_history
                .entry(proposer)
                .or_default()
                .push(PeerAction::Defect);
            return;
        }

        if !accepted {
            ctx.log.info(
                ctx.tick,
                self.source(),
                "counter-proposal rejected".to_string(),
            );
            return;
        }

        if let Some((station_id, queue_pos)) = new_assignment {
            let station_coord = ctx
                .stations
                .iter()
                .find(|station| station.id == station_id)
                .map(|station| station.coord)
                .or(self.assigned_coord);
            if let Some(coord) = station_coord {
                self.assigned_station = Some(station_id);
                self.assigned_coord = Some(coord);
                self.queue_pos = Some(queue_pos);
                ctx.log.action(
                    ctx.tick,
                    self.source(),
                    format!("counter-proposal accepted, now position {queue_pos} at station {station_id}"),
                );
                self.retarget(ctx, coord, queue_pos);
            }
        }
    }

    /// Points the vehicle at the cell its new queue position implies and
    /// starts moving if it was parked.
    fn retarget(&mut self, ctx: &mut VehicleCtx<'_>, station_coord: Coord, queue_pos: u32) {
        let new_goal = if queue_pos == 0 {
            station_coord
        } else {
            waiting_cell(ctx.grid, station_coord, queue_pos)
        };

        if self.goal != Some(new_goal) {
            self.goal = Some(new_goal);
            self.path.clear();
        }
        if matches!(self.state, VehicleState::Idle | VehicleState::Waiting) && self.coord != new_goal
        {
            self.state = VehicleState::Moving;
        }
    }

    fn advance(&mut self, ctx: &mut VehicleCtx<'_>) {
        if self.path.is_empty() {
            if self.goal == Some(self.coord) {
                self.arrive(ctx);
                return;
            }
            self.plan_path(ctx, &BTreeSet::new());
        }
        let Some(&next) = self.path.front() else {
            return;
        };

        // Entering the station cell itself requires being queue head with a
        // free slot; otherwise hold short.
        if self.state == VehicleState::Moving && self.assigned_coord == Some(next) {
            if self.queue_pos != Some(0) {
                // Demoted mid-route: the path still points at the station.
                self.path.clear();
                return;
            }
            let slot_free = self
                .assigned_station
                .and_then(|id| ctx.stations.iter().find(|station| station.id == id))
                .map(|station| station.has_free_slot())
                .unwrap_or(false);
            if !slot_free {
                return;
            }
        }

        // Rule 1: the cell is reserved for the next tick by someone else.
        if let Some(owner) = ctx.reservations.is_reserved(ctx.tick + 1, next) {
            if owner != self.id {
                self.yield_tick(ctx, &[owner]);
                return;
            }
        }

        // Rule 2: a lower id intends the same cell this tick.
        let lower_intender = ctx
            .others
            .values()
            .find(|other| {
                other.id < self.id
                    && !other.state.is_terminal()
                    && other.path.front() == Some(&next)
            })
            .map(|other| other.id);
        if let Some(blocker) = lower_intender {
            self.yield_tick(ctx, &[blocker]);
            return;
        }

        // Rule 3: the cell is occupied right now.
        let occupant = ctx
            .others
            .values()
            .find(|other| !other.state.is_terminal() && other.coord == next)
            .map(|other| (other.id, other.path.front() == Some(&self.coord)));
        if let Some((blocker, swap)) = occupant {
            if swap && self.id < blocker {
                // Head-on swap: priority is ours, hold the claim without
                // burning a yield while the higher id gets out of the way.
                return;
            }
            self.yield_tick(ctx, &[blocker]);
            return;
        }

        // Rule 4: move.
        self.path.pop_front();
        self.coord = next;
        self.yields_in_a_row = 0;
        *ctx.moved = true;
        ctx.metrics.record_move(self.id, 1);
        if self.trail.back() != Some(&self.coord) {
            self.trail.push_back(self.coord);
            if self.trail.len() > TRAIL_LEN {
                self.trail.pop_front();
            }
        }

        if self.goal == Some(self.coord) {
            self.arrive(ctx);
        }
    }

    fn arrive(&mut self, ctx: &mut VehicleCtx<'_>) {
        match self.state {
            VehicleState::Moving => {
                if self.assigned_coord == Some(self.coord) && self.queue_pos == Some(0) {
                    self.state = VehicleState::Charging;
                    self.path.clear();
                    ctx.log.action(
                        ctx.tick,
                        self.source(),
                        format!("started charging ({:.1}%)", self.battery),
                    );
                } else if self.queue_pos.map_or(false, |pos| pos > 0) {
                    self.state = VehicleState::Waiting;
                    self.path.clear();
                    ctx.log.info(
                        ctx.tick,
                        self.source(),
                        format!(
                            "holding at waiting cell, queue position {}",
                            self.queue_pos.unwrap_or(0)
                        ),
                    );
                }
            }
            VehicleState::Exiting => {
                if self.coord == ctx.grid.exit() {
                    self.state = VehicleState::Completed;
                    self.completed_tick = Some(ctx.tick);
                    self.path.clear();
                    self.goal = None;
                    ctx.reservations.clear_vehicle(self.id);
                    ctx.metrics.record_completed(self.id, ctx.tick);
                    ctx.log.action(
                        ctx.tick,
                        self.source(),
                        "reached exit, run complete".to_string(),
                    );
                }
            }
            _ => {}
        }
    }

    fn charge(&mut self, ctx: &mut VehicleCtx<'_>) {
        self.battery = (self.battery + ctx.params.charge_per_step).min(100.0);
        ctx.metrics.record_charging_tick(self.id);
        // A charging fleet is making progress even when nothing moves.
        *ctx.moved = true;

        if self.battery >= ctx.params.charge_target {
            ctx.log.action(
                ctx.tick,
                self.source(),
                format!("charging complete ({:.1}%), heading to exit", self.battery),
            );
            self.assigned_station = None;
            self.assigned_coord = None;
            self.queue_pos = None;
            self.state = VehicleState::Exiting;
            self.goal = Some(ctx.grid.exit());
            self.path.clear();
            self.plan_path(ctx, &BTreeSet::new());
        }
    }

    fn yield_tick(&mut self, ctx: &mut VehicleCtx<'_>, blockers: &[VehicleId]) {
        self.yields_in_a_row += 1;
        ctx.metrics.record_yield(self.id);

        if self.yields_in_a_row >= YIELDS_BEFORE_REPLAN {
            let blocked: BTreeSet<Coord> = blockers
                .iter()
                .filter_map(|id| ctx.others.get(id).map(|other| other.coord))
                .collect();
            ctx.log.info(
                ctx.tick,
                self.source(),
                format!("blocked for {} ticks, replanning", self.yields_in_a_row),
            );
            self.yields_in_a_row = 0;
            self.replan(ctx, &blocked);
        }
    }

    fn replan(&mut self, ctx: &mut VehicleCtx<'_>, extra_blocked: &BTreeSet<Coord>) {
        ctx.reservations.clear_vehicle(self.id);
        self.path.clear();
        ctx.metrics.record_replan(self.id);
        self.plan_path(ctx, extra_blocked);
    }

    fn plan_path(&mut self, ctx: &mut VehicleCtx<'_>, extra_blocked: &BTreeSet<Coord>) {
        let Some(goal) = self.goal else {
            return;
        };
        if goal == self.coord {
            return;
        }

        // Parked vehicles are routed around; moving ones are handled by the
        // collision rules and reservations.
        let mut blocked: BTreeSet<Coord> = ctx
            .others
            .values()
            .filter(|other| {
                !matches!(
                    other.state,
                    VehicleState::Moving | VehicleState::Exiting | VehicleState::Completed
                )
            })
            .map(|other| other.coord)
            .collect();
        blocked.extend(extra_blocked.iter().copied());
        // Queued vehicles route around the station cell they are not yet
        // allowed to enter.
        if self.queue_pos.map_or(false, |pos| pos > 0) {
            if let Some(station_coord) = self.assigned_coord {
                if goal != station_coord {
                    blocked.insert(station_coord);
                }
            }
        }
        blocked.remove(&self.coord);

        match crate::planner::plan(self.coord, goal, ctx.grid, &blocked) {
            Some(cells) => {
                self.no_path_streak = 0;
                self.path = cells.into_iter().skip(1).collect();
                ctx.log.info(
                    ctx.tick,
                    self.source(),
                    format!("planned path to {goal} ({} steps)", self.path.len()),
                );
            }
            None => {
                self.no_path_streak += 1;
                ctx.log.warning(
                    ctx.tick,
                    self.source(),
                    format!(
                        "no path to {goal} (attempt {}/{})",
                        self.no_path_streak, NO_PATH_LIMIT
                    ),
                );
                if self.no_path_streak >= NO_PATH_LIMIT {
                    self.strand(ctx, "no path to target");
                }
            }
        }
    }

    fn strand(&mut self, ctx: &mut VehicleCtx<'_>, reason: &str) {
        self.battery = self.battery.max(0.0);
        self.state = VehicleState::Stranded;
        self.path.clear();
        self.goal = None;
        ctx.reservations.clear_vehicle(self.id);
        ctx.metrics.record_stranded(self.id);
        ctx.log.error(ctx.tick, self.source(), format!("stranded: {reason}"));
    }

    /// Step 6 of the vehicle tick: drop stale claims, then re-reserve the
    /// planned prefix (or the current cell when parked).
    fn refresh_reservations(&mut self, ctx: &mut VehicleCtx<'_>) {
        if self.state.is_terminal() {
            return;
        }
        ctx.reservations.clear_vehicle(self.id);

        if matches!(self.state, VehicleState::Moving | VehicleState::Exiting)
            && !self.path.is_empty()
        {
            let cells: Vec<Coord> = self.path.iter().copied().collect();
            if ctx
                .reservations
                .reserve_path(self.id, ctx.tick + 1, &cells)
                .is_err()
            {
                // Fall back to claiming just the next cell; the conflict will
                // surface through rule 1 and trigger a replan if it persists.
                let _ = ctx.reservations.reserve(self.id, ctx.tick + 1, cells[0]);
            }
        } else {
            let _ = ctx.reservations.reserve(self.id, ctx.tick + 1, self.coord);
        }
    }
}

/// Normalized urgency: battery deficit in [0, 1] plus 0.1 per tick waited.
pub fn urgency_score(battery: f64, ticks_waiting: u64, params: &SimParams) -> f64 {
    let deficit = ((params.low_threshold - battery) / params.low_threshold).max(0.0);
    deficit + 0.1 * ticks_waiting as f64
}

/// Deterministic waiting cell next to a station: walkable neighbors in the
/// fixed probe order, indexed by queue position.
pub fn waiting_cell(grid: &Grid, station_coord: Coord, queue_pos: u32) -> Coord {
    let neighbors = grid.neighbors4(station_coord);
    if neighbors.is_empty() {
        return station_coord;
    }
    let index = (queue_pos.saturating_sub(1) as usize) % neighbors.len();
    neighbors[index]
}
