//! Per-run metrics: vehicle travel and waiting, station utilization,
//! negotiation outcomes, and a Jain fairness index over completion times.

use std::collections::BTreeMap;

use contracts::{
    Behavior, MetricsSummary, StationId, StationMetricsRow, VehicleId, VehicleMetricsRow,
    VehicleOutcome,
};

use crate::grid::ChargingStation;

#[derive(Debug, Clone, Default)]
struct VehicleTally {
    distance_traveled: u64,
    ticks_charging: u64,
    ticks_waiting: u64,
    replans: u64,
    yields: u64,
    outcome: Option<VehicleOutcome>,
    ticks_to_complete: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct StationTally {
    occupied_ticks: u64,
    peak_queue: u32,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_ticks: u64,
    vehicles: BTreeMap<VehicleId, VehicleTally>,
    stations: BTreeMap<StationId, StationTally>,
    counter_proposals: u64,
    proposals_accepted: u64,
    proposals_rejected: u64,
    accepts_by_behavior: BTreeMap<String, u64>,
    disputes_by_behavior: BTreeMap<String, u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn vehicle(&mut self, id: VehicleId) -> &mut VehicleTally {
        self.vehicles.entry(id).or_default()
    }

    pub fn record_move(&mut self, id: VehicleId, cells: u64) {
        self.vehicle(id).distance_traveled += cells;
    }

    pub fn record_charging_tick(&mut self, id: VehicleId) {
        self.vehicle(id).ticks_charging += 1;
    }

    pub fn record_waiting_tick(&mut self, id: VehicleId) {
        self.vehicle(id).ticks_waiting += 1;
    }

    pub fn record_replan(&mut self, id: VehicleId) {
        self.vehicle(id).replans += 1;
    }

    pub fn record_yield(&mut self, id: VehicleId) {
        self.vehicle(id).yields += 1;
    }

    pub fn record_completed(&mut self, id: VehicleId, tick: u64) {
        let tally = self.vehicle(id);
        tally.outcome = Some(VehicleOutcome::Completed);
        tally.ticks_to_complete = Some(tick);
    }

    pub fn record_stranded(&mut self, id: VehicleId) {
        self.vehicle(id).outcome = Some(VehicleOutcome::Stranded);
    }

    pub fn record_counter_proposal(&mut self) {
        self.counter_proposals += 1;
    }

    pub fn record_proposal_verdict(&mut self, accepted: bool) {
        if accepted {
            self.proposals_accepted += 1;
        } else {
            self.proposals_rejected += 1;
        }
    }

    pub fn record_decision(&mut self, behavior: Behavior, disputed: bool) {
        let bucket = if disputed {
            &mut self.disputes_by_behavior
        } else {
            &mut self.accepts_by_behavior
        };
        *bucket.entry(behavior.as_str().to_string()).or_default() += 1;
    }

    /// Samples station occupancy at the end of a tick.
    pub fn collect(&mut self, stations: &[ChargingStation]) {
        self.total_ticks += 1;
        for station in stations {
            let tally = self.stations.entry(station.id).or_default();
            if !station.occupants.is_empty() {
                tally.occupied_ticks += 1;
            }
            tally.peak_queue = tally.peak_queue.max(station.queue.len() as u32);
        }
    }

    pub fn total_yields(&self) -> u64 {
        self.vehicles.values().map(|tally| tally.yields).sum()
    }

    pub fn summary(&self) -> MetricsSummary {
        let vehicles = self
            .vehicles
            .iter()
            .map(|(&vehicle_id, tally)| VehicleMetricsRow {
                vehicle_id,
                distance_traveled: tally.distance_traveled,
                ticks_charging: tally.ticks_charging,
                ticks_waiting: tally.ticks_waiting,
                replans: tally.replans,
                yields: tally.yields,
                outcome: tally.outcome,
                ticks_to_complete: tally.ticks_to_complete,
            })
            .collect();

        let stations = self
            .stations
            .iter()
            .map(|(&station_id, tally)| StationMetricsRow {
                station_id,
                occupied_ticks: tally.occupied_ticks,
                utilization: if self.total_ticks == 0 {
                    0.0
                } else {
                    tally.occupied_ticks as f64 / self.total_ticks as f64
                },
                peak_queue: tally.peak_queue,
            })
            .collect();

        MetricsSummary {
            total_ticks: self.total_ticks,
            vehicles,
            stations,
            yields_averted: self.total_yields(),
            counter_proposals: self.counter_proposals,
            proposals_accepted: self.proposals_accepted,
            proposals_rejected: self.proposals_rejected,
            accepts_by_behavior: self.accepts_by_behavior.clone(),
            disputes_by_behavior: self.disputes_by_behavior.clone(),
            fairness_index: self.fairness_index(),
        }
    }

    /// Jain index over ticks-to-complete: (sum x)^2 / (n * sum x^2).
    fn fairness_index(&self) -> Option<f64> {
        let times: Vec<f64> = self
            .vehicles
            .values()
            .filter_map(|tally| tally.ticks_to_complete)
            .map(|ticks| ticks as f64)
            .collect();
        if times.is_empty() {
            return None;
        }
        let sum: f64 = times.iter().sum();
        let sum_sq: f64 = times.iter().map(|x| x * x).sum();
        if sum_sq == 0.0 {
            return Some(1.0);
        }
        Some((sum * sum) / (times.len() as f64 * sum_sq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Coord;

    #[test]
    fn station_utilization_counts_occupied_ticks() {
        let mut metrics = MetricsCollector::new();
        let mut station = ChargingStation::new(0, Coord::new(1, 1), 1);

        metrics.collect(std::slice::from_ref(&station));
        station.occupants.push(3);
        station.queue.extend([4, 5]);
        metrics.collect(std::slice::from_ref(&station));

        let summary = metrics.summary();
        assert_eq!(summary.total_ticks, 2);
        let row = &summary.stations[0];
        assert_eq!(row.occupied_ticks, 1);
        assert!((row.utilization - 0.5).abs() < 1e-9);
        assert_eq!(row.peak_queue, 2);
    }

    #[test]
    fn fairness_is_one_for_equal_completion_times() {
        let mut metrics = MetricsCollector::new();
        metrics.record_completed(0, 40);
        metrics.record_completed(1, 40);
        let fairness = metrics.summary().fairness_index.expect("fairness");
        assert!((fairness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fairness_drops_for_skewed_completion_times() {
        let mut metrics = MetricsCollector::new();
        metrics.record_completed(0, 10);
        metrics.record_completed(1, 90);
        let fairness = metrics.summary().fairness_index.expect("fairness");
        assert!(fairness < 0.7);
    }

    #[test]
    fn decision_counters_bucket_by_behavior() {
        let mut metrics = MetricsCollector::new();
        metrics.record_decision(Behavior::Competitive, true);
        metrics.record_decision(Behavior::Competitive, true);
        metrics.record_decision(Behavior::Cooperative, false);

        let summary = metrics.summary();
        assert_eq!(summary.disputes_by_behavior.get("competitive"), Some(&2));
        assert_eq!(summary.accepts_by_behavior.get("cooperative"), Some(&1));
        assert_eq!(summary.disputes_by_behavior.get("cooperative"), None);
    }
}
