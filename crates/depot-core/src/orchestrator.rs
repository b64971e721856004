//! Central orchestrator: Hungarian assignment, station queue protocol, and
//! counter-proposal arbitration.
//!
//! The orchestrator holds vehicle ids and its own views, never vehicle
//! references. It runs strictly after all vehicles in the tick, and it is
//! the only code that mutates station occupancy and queues.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    AgentMessage, Coord, ProposalTarget, SimParams, StationId, VehicleId, VehicleState,
};

use crate::assign::{self, StationOffer, VehicleBid};
use crate::bus::{Address, MessageBus};
use crate::grid::ChargingStation;
use crate::metrics::MetricsCollector;
use crate::vehicle::urgency_score;
use crate::world::ActivityLog;

/// Authoritative post-move view of one vehicle, built by the world after the
/// vehicle phase of the tick.
#[derive(Debug, Clone, Copy)]
pub struct RosterEntry {
    pub coord: Coord,
    pub battery: f64,
    pub state: VehicleState,
}

/// Last status message received from a vehicle.
#[derive(Debug, Clone, Copy)]
struct StatusView {
    coord: Coord,
    battery: f64,
    state: VehicleState,
}

#[derive(Debug, Clone)]
struct Proposal {
    vehicle: VehicleId,
    station: StationId,
    target: ProposalTarget,
    reason: String,
}

pub struct OrchestratorCtx<'a> {
    pub tick: u64,
    pub params: &'a SimParams,
    pub stations: &'a mut Vec<ChargingStation>,
    pub roster: &'a BTreeMap<VehicleId, RosterEntry>,
    pub bus: &'a mut MessageBus,
    pub metrics: &'a mut MetricsCollector,
    pub log: &'a mut ActivityLog,
    /// Set whenever assignments, queues, or occupancy change; feeds deadlock
    /// detection.
    pub progressed: &'a mut bool,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    status_view: BTreeMap<VehicleId, StatusView>,
    /// Current assignment intent per vehicle: station and queue position.
    /// Position 0 covers both occupants and vehicles inbound to a free slot.
    positions: BTreeMap<VehicleId, (StationId, u32)>,
    /// Ticks each vehicle has spent waiting while queued; the wait term of
    /// urgency.
    wait_ticks: BTreeMap<VehicleId, u64>,
    /// Proposals deferred past the one-accept-per-tick cap.
    deferred: Vec<Proposal>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, ctx: &mut OrchestratorCtx<'_>) {
        let proposals = self.drain_inbox(ctx);
        self.reconcile_stations(ctx);
        self.assign_waiting(ctx);
        self.process_proposals(ctx, proposals);
    }

    fn drain_inbox(&mut self, ctx: &mut OrchestratorCtx<'_>) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = self.deferred.drain(..).collect();

        for message in ctx.bus.drain(Address::Orchestrator) {
            match message {
                AgentMessage::StatusUpdate {
                    vehicle_id,
                    coord,
                    battery,
                    state,
                    ..
                } => {
                    // Wait accrues only while queued at a station; the time a
                    // vehicle spends waiting for its first assignment is not
                    // an urgency advantage over peers assigned later.
                    if state == VehicleState::Waiting && self.positions.contains_key(&vehicle_id) {
                        *self.wait_ticks.entry(vehicle_id).or_default() += 1;
                    }
                    self.status_view.insert(
                        vehicle_id,
                        StatusView {
                            coord,
                            battery,
                            state,
                        },
                    );
                }
                AgentMessage::CounterProposal {
                    vehicle_id,
                    current_station,
                    target,
                    reason,
                    ..
                } => {
                    proposals.push(Proposal {
                        vehicle: vehicle_id,
                        station: current_station,
                        target,
                        reason,
                    });
                }
                _ => {}
            }
        }

        // Deterministic processing order: (sender, target station).
        proposals.sort_by_key(|proposal| (proposal.vehicle, proposal.station));
        proposals
    }

    /// Number of vehicles inbound to a free slot (position 0, not yet an
    /// occupant) at `station`.
    fn pending_zero(&self, station: &ChargingStation) -> u32 {
        self.positions
            .iter()
            .filter(|&(vehicle, &(sid, pos))| {
                sid == station.id && pos == 0 && !station.occupants.contains(vehicle)
            })
            .count() as u32
    }

    fn effective_load(&self, station: &ChargingStation) -> u32 {
        station.load() + self.pending_zero(station)
    }

    /// Syncs occupancy with the post-move roster: admits arrivals, releases
    /// leavers and terminal vehicles, then promotes queue heads into freed
    /// slots and renumbers.
    fn reconcile_stations(&mut self, ctx: &mut OrchestratorCtx<'_>) {
        // Terminal or vanished vehicles give up their assignment intent,
        // including inbound position-0 claims that would otherwise pin a
        // slot forever.
        let stale: Vec<VehicleId> = self
            .positions
            .keys()
            .filter(|&vehicle| {
                ctx.roster
                    .get(vehicle)
                    .map_or(true, |entry| entry.state.is_terminal())
            })
            .copied()
            .collect();
        for vehicle in stale {
            self.positions.remove(&vehicle);
            *ctx.progressed = true;
        }

        for index in 0..ctx.stations.len() {
            let station = &mut ctx.stations[index];
            let station_id = station.id;
            let coord = station.coord;

            let mut released: Vec<VehicleId> = Vec::new();
            station.occupants.retain(|&vehicle| {
                let keep = ctx.roster.get(&vehicle).map_or(false, |entry| {
                    entry.state == VehicleState::Charging && entry.coord == coord
                });
                if !keep {
                    released.push(vehicle);
                }
                keep
            });
            for vehicle in released {
                self.positions.remove(&vehicle);
                *ctx.progressed = true;
                ctx.log.info(
                    ctx.tick,
                    "orchestrator".to_string(),
                    format!("vehicle_{vehicle} released its slot at station {station_id}"),
                );
            }

            // Queued vehicles that stranded or otherwise left the protocol.
            let mut dropped: Vec<VehicleId> = Vec::new();
            station.queue.retain(|&vehicle| {
                let keep = ctx
                    .roster
                    .get(&vehicle)
                    .map_or(false, |entry| !entry.state.is_terminal());
                if !keep {
                    dropped.push(vehicle);
                }
                keep
            });
            for vehicle in dropped {
                self.positions.remove(&vehicle);
                *ctx.progressed = true;
            }

            // Admit arrivals that started charging this tick.
            let arrivals: Vec<VehicleId> = self
                .positions
                .iter()
                .filter(|&(vehicle, &(sid, pos))| {
                    sid == station_id
                        && pos == 0
                        && !station.occupants.contains(vehicle)
                        && ctx.roster.get(vehicle).map_or(false, |entry| {
                            entry.state == VehicleState::Charging && entry.coord == coord
                        })
                })
                .map(|(&vehicle, _)| vehicle)
                .collect();
            for vehicle in arrivals {
                if (station.occupants.len() as u32) < station.capacity {
                    station.occupants.push(vehicle);
                    *ctx.progressed = true;
                    ctx.log.action(
                        ctx.tick,
                        "orchestrator".to_string(),
                        format!("vehicle_{vehicle} now occupies station {station_id}"),
                    );
                }
            }

            self.promote_and_renumber(ctx, index);
        }
    }

    /// Moves queue heads into freed slots and keeps queue numbering
    /// contiguous, emitting fresh assignments for every change.
    fn promote_and_renumber(&mut self, ctx: &mut OrchestratorCtx<'_>, station_index: usize) {
        let station_id = ctx.stations[station_index].id;
        let coord = ctx.stations[station_index].coord;

        loop {
            let head = {
                let station = &mut ctx.stations[station_index];
                let free = station.capacity
                    > station.occupants.len() as u32 + self.pending_zero(station);
                if !free || station.queue.is_empty() {
                    break;
                }
                station.queue.remove(0)
            };
            self.positions.insert(head, (station_id, 0));
            ctx.bus.send(
                Address::Orchestrator,
                Address::Vehicle(head),
                AgentMessage::Assignment {
                    vehicle_id: head,
                    station_id,
                    station_coord: coord,
                    queue_pos: 0,
                    priority: 0,
                },
            );
            *ctx.progressed = true;
            ctx.log.action(
                ctx.tick,
                "orchestrator".to_string(),
                format!("promoted vehicle_{head} to the head of station {station_id}"),
            );
        }

        let queue: Vec<VehicleId> = ctx.stations[station_index].queue.clone();
        for (index, vehicle) in queue.into_iter().enumerate() {
            let pos = index as u32 + 1;
            if self.positions.get(&vehicle) != Some(&(station_id, pos)) {
                self.positions.insert(vehicle, (station_id, pos));
                ctx.bus.send(
                    Address::Orchestrator,
                    Address::Vehicle(vehicle),
                    AgentMessage::Assignment {
                        vehicle_id: vehicle,
                        station_id,
                        station_coord: coord,
                        queue_pos: pos,
                        priority: pos,
                    },
                );
                *ctx.progressed = true;
            }
        }
    }

    /// Hungarian assignment over vehicles that are waiting without a station.
    fn assign_waiting(&mut self, ctx: &mut OrchestratorCtx<'_>) {
        let unassigned: Vec<(VehicleId, StatusView)> = self
            .status_view
            .iter()
            .filter(|&(vehicle, view)| {
                view.state == VehicleState::Waiting && !self.positions.contains_key(vehicle)
            })
            .map(|(&vehicle, &view)| (vehicle, view))
            .collect();
        if unassigned.is_empty() {
            return;
        }

        let eligible: Vec<(usize, StationOffer)> = ctx
            .stations
            .iter()
            .enumerate()
            .filter(|(_, station)| match ctx.params.queue_cap {
                Some(cap) => self.effective_load(station) < station.capacity + cap,
                None => true,
            })
            .map(|(index, station)| {
                (
                    index,
                    StationOffer {
                        coord: station.coord,
                        load: self.effective_load(station),
                    },
                )
            })
            .collect();

        if eligible.is_empty() {
            ctx.log.warning(
                ctx.tick,
                "orchestrator".to_string(),
                format!(
                    "no eligible station for {} waiting vehicle(s)",
                    unassigned.len()
                ),
            );
            return;
        }

        let bids: Vec<VehicleBid> = unassigned
            .iter()
            .map(|(_, view)| VehicleBid {
                coord: view.coord,
                battery: view.battery,
            })
            .collect();
        let offers: Vec<StationOffer> = eligible.iter().map(|(_, offer)| *offer).collect();
        let cost = assign::cost_matrix(&bids, &offers, ctx.params);
        let matching = assign::solve(&cost);

        for (row, &column) in matching.iter().enumerate() {
            if column >= eligible.len() {
                // Virtual station: the vehicle keeps waiting this tick.
                continue;
            }
            let (vehicle, _) = unassigned[row];
            let station_index = eligible[column].0;
            let queue_pos = self.enqueue(ctx, station_index, vehicle);
            let station_id = ctx.stations[station_index].id;
            let coord = ctx.stations[station_index].coord;
            ctx.bus.send(
                Address::Orchestrator,
                Address::Vehicle(vehicle),
                AgentMessage::Assignment {
                    vehicle_id: vehicle,
                    station_id,
                    station_coord: coord,
                    queue_pos,
                    priority: row as u32,
                },
            );
            *ctx.progressed = true;
            ctx.log.action(
                ctx.tick,
                "orchestrator".to_string(),
                format!(
                    "assigned vehicle_{vehicle} to station {station_id} (queue position {queue_pos})"
                ),
            );
        }
    }

    fn urgency_of(&self, vehicle: VehicleId, params: &SimParams) -> f64 {
        let battery = self
            .status_view
            .get(&vehicle)
            .map(|view| view.battery)
            .unwrap_or(100.0);
        let waited = self.wait_ticks.get(&vehicle).copied().unwrap_or(0);
        urgency_score(battery, waited, params)
    }

    /// Everyone currently assigned to `station`, for decision broadcasts.
    fn station_members(&self, station: StationId) -> Vec<VehicleId> {
        self.positions
            .iter()
            .filter(|(_, (sid, _))| *sid == station)
            .map(|(&vehicle, _)| vehicle)
            .collect()
    }

    fn broadcast_decision(
        &self,
        ctx: &mut OrchestratorCtx<'_>,
        station: StationId,
        proposer: VehicleId,
        accepted: bool,
        new_assignment: Option<(StationId, u32)>,
    ) {
        let mut members = self.station_members(station);
        if !members.contains(&proposer) {
            members.push(proposer);
        }
        for member in members {
            ctx.bus.send(
                Address::Orchestrator,
                Address::Vehicle(member),
                AgentMessage::AssignmentDecision {
                    vehicle_id: proposer,
                    accepted,
                    new_assignment,
                },
            );
        }
    }

    fn process_proposals(&mut self, ctx: &mut OrchestratorCtx<'_>, proposals: Vec<Proposal>) {
        let mut accepted_this_tick: BTreeSet<VehicleId> = BTreeSet::new();

        for proposal in proposals {
            if accepted_this_tick.contains(&proposal.vehicle) {
                self.deferred.push(proposal);
                continue;
            }

            let accepted = match proposal.target {
                ProposalTarget::QueuePosition(target_pos) => {
                    self.try_queue_swap(ctx, &proposal, target_pos)
                }
                ProposalTarget::Station(target_station) => {
                    self.try_station_move(ctx, &proposal, target_station)
                }
            };

            ctx.metrics.record_proposal_verdict(accepted);
            if accepted {
                accepted_this_tick.insert(proposal.vehicle);
                *ctx.progressed = true;
            }
        }
    }

    /// §same-station case: swap with the holder of the requested position if
    /// the proposer's urgency clears the epsilon margin.
    fn try_queue_swap(
        &mut self,
        ctx: &mut OrchestratorCtx<'_>,
        proposal: &Proposal,
        target_pos: u32,
    ) -> bool {
        let proposer = proposal.vehicle;
        let station_id = proposal.station;

        let Some(&(held_station, current_pos)) = self.positions.get(&proposer) else {
            self.broadcast_decision(ctx, station_id, proposer, false, None);
            return false;
        };
        if held_station != station_id || target_pos >= current_pos {
            self.broadcast_decision(ctx, station_id, proposer, false, None);
            return false;
        }

        let Some(station_index) = ctx
            .stations
            .iter()
            .position(|station| station.id == station_id)
        else {
            self.broadcast_decision(ctx, station_id, proposer, false, None);
            return false;
        };

        // Identify the displaced holder. Position 0 can only be contested
        // while its holder is still inbound; occupants are never evicted.
        let holder = if target_pos == 0 {
            self.positions
                .iter()
                .filter(|&(vehicle, &(sid, pos))| {
                    sid == station_id
                        && pos == 0
                        && !ctx.stations[station_index].occupants.contains(vehicle)
                })
                .map(|(&vehicle, _)| vehicle)
                .min()
        } else {
            ctx.stations[station_index]
                .queue
                .get(target_pos as usize - 1)
                .copied()
        };
        let Some(holder) = holder else {
            self.broadcast_decision(ctx, station_id, proposer, false, None);
            return false;
        };

        let gain = self.urgency_of(proposer, ctx.params) - self.urgency_of(holder, ctx.params);
        if gain < ctx.params.urgency_epsilon {
            ctx.log.info(
                ctx.tick,
                "orchestrator".to_string(),
                format!(
                    "rejected vehicle_{proposer}'s bid for position {target_pos} at station {station_id} (gain {gain:.2})"
                ),
            );
            self.broadcast_decision(ctx, station_id, proposer, false, None);
            return false;
        }

        let station = &mut ctx.stations[station_index];
        if target_pos == 0 {
            // Proposer leaves the queue; the displaced holder takes its slot.
            station.queue.retain(|&vehicle| vehicle != proposer);
            let insert_at = (current_pos as usize - 1).min(station.queue.len());
            station.queue.insert(insert_at, holder);
        } else {
            let a = target_pos as usize - 1;
            let b = current_pos as usize - 1;
            station.queue.swap(a, b);
        }
        self.positions.insert(proposer, (station_id, target_pos));
        self.positions.insert(holder, (station_id, current_pos));

        ctx.log.action(
            ctx.tick,
            "orchestrator".to_string(),
            format!(
                "swap at station {station_id}: vehicle_{proposer} -> position {target_pos}, vehicle_{holder} -> position {current_pos} ({})",
                proposal.reason
            ),
        );

        self.broadcast_decision(
            ctx,
            station_id,
            proposer,
            true,
            Some((station_id, target_pos)),
        );
        let coord = ctx.stations[station_index].coord;
        ctx.bus.send(
            Address::Orchestrator,
            Address::Vehicle(holder),
            AgentMessage::Assignment {
                vehicle_id: holder,
                station_id,
                station_coord: coord,
                queue_pos: current_pos,
                priority: current_pos,
            },
        );
        true
    }

    /// Cross-station case: accept when swapping the proposer with the tail
    /// of the target station (or moving into spare capacity) strictly
    /// lowers the pairwise assignment cost.
    fn try_station_move(
        &mut self,
        ctx: &mut OrchestratorCtx<'_>,
        proposal: &Proposal,
        target_station: StationId,
    ) -> bool {
        let proposer = proposal.vehicle;

        let Some(&(current_station, current_pos)) = self.positions.get(&proposer) else {
            self.broadcast_decision(ctx, proposal.station, proposer, false, None);
            return false;
        };
        if current_station == target_station {
            self.broadcast_decision(ctx, current_station, proposer, false, None);
            return false;
        }
        let (Some(current_index), Some(target_index)) = (
            ctx.stations
                .iter()
                .position(|station| station.id == current_station),
            ctx.stations
                .iter()
                .position(|station| station.id == target_station),
        ) else {
            self.broadcast_decision(ctx, current_station, proposer, false, None);
            return false;
        };

        let Some(proposer_view) = self.status_view.get(&proposer).copied() else {
            self.broadcast_decision(ctx, current_station, proposer, false, None);
            return false;
        };
        let proposer_bid = VehicleBid {
            coord: proposer_view.coord,
            battery: proposer_view.battery,
        };
        let current_offer = StationOffer {
            coord: ctx.stations[current_index].coord,
            load: self.effective_load(&ctx.stations[current_index]),
        };
        let target_offer = StationOffer {
            coord: ctx.stations[target_index].coord,
            load: self.effective_load(&ctx.stations[target_index]),
        };

        let counterpart = ctx.stations[target_index].queue.last().copied();
        let improves = match counterpart {
            Some(other) => {
                let Some(other_view) = self.status_view.get(&other).copied() else {
                    self.broadcast_decision(ctx, current_station, proposer, false, None);
                    return false;
                };
                let other_bid = VehicleBid {
                    coord: other_view.coord,
                    battery: other_view.battery,
                };
                let now = assign::pair_cost(&proposer_bid, &current_offer, ctx.params)
                    + assign::pair_cost(&other_bid, &target_offer, ctx.params);
                let swapped = assign::pair_cost(&proposer_bid, &target_offer, ctx.params)
                    + assign::pair_cost(&other_bid, &current_offer, ctx.params);
                swapped < now
            }
            None => {
                let has_room = self.effective_load(&ctx.stations[target_index])
                    < ctx.stations[target_index].capacity;
                has_room
                    && assign::pair_cost(&proposer_bid, &target_offer, ctx.params)
                        < assign::pair_cost(&proposer_bid, &current_offer, ctx.params)
            }
        };

        if !improves {
            self.broadcast_decision(ctx, current_station, proposer, false, None);
            return false;
        }

        // Pull the proposer out of its current station.
        {
            let station = &mut ctx.stations[current_index];
            station.queue.retain(|&vehicle| vehicle != proposer);
        }
        self.positions.remove(&proposer);

        match counterpart {
            Some(other) => {
                // The displaced tail inherits the proposer's old station.
                {
                    let station = &mut ctx.stations[target_index];
                    station.queue.retain(|&vehicle| vehicle != other);
                }
                self.positions.remove(&other);
                let other_pos = self.enqueue(ctx, current_index, other);
                let coord = ctx.stations[current_index].coord;
                ctx.bus.send(
                    Address::Orchestrator,
                    Address::Vehicle(other),
                    AgentMessage::Assignment {
                        vehicle_id: other,
                        station_id: current_station,
                        station_coord: coord,
                        queue_pos: other_pos,
                        priority: other_pos,
                    },
                );
            }
            None => {}
        }

        let new_pos = self.enqueue(ctx, target_index, proposer);
        self.promote_and_renumber(ctx, current_index);
        self.promote_and_renumber(ctx, target_index);
        self.broadcast_decision(
            ctx,
            current_station,
            proposer,
            true,
            Some((target_station, new_pos)),
        );
        ctx.log.action(
            ctx.tick,
            "orchestrator".to_string(),
            format!(
                "moved vehicle_{proposer} from station {current_station} to station {target_station} ({})",
                proposal.reason
            ),
        );
        true
    }

    /// Appends a vehicle to a station, returning its queue position.
    fn enqueue(&mut self, ctx: &mut OrchestratorCtx<'_>, station_index: usize, vehicle: VehicleId) -> u32 {
        let station = &mut ctx.stations[station_index];
        let slot_free =
            station.occupants.len() as u32 + self.pending_zero(station) < station.capacity;
        let pos = if slot_free {
            0
        } else {
            station.queue.push(vehicle);
            station.queue.len() as u32
        };
        self.positions.insert(vehicle, (station.id, pos));
        pos
    }
}
