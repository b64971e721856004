//! Optimal vehicle-to-station matching.
//!
//! Builds the weighted cost matrix over candidate vehicles and eligible
//! stations, pads with virtual columns when vehicles outnumber stations, and
//! solves the rectangular linear sum assignment with the Hungarian
//! algorithm (potentials formulation, O(n^2 m)).

use contracts::{Coord, SimParams};

/// Cost assigned to virtual padding columns. Any real assignment is cheaper,
/// so a vehicle matched to a virtual column simply keeps its prior state.
pub const VIRTUAL_COST: f64 = 1.0e9;

#[derive(Debug, Clone, Copy)]
pub struct VehicleBid {
    pub coord: Coord,
    pub battery: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct StationOffer {
    pub coord: Coord,
    /// Occupants plus queued plus inbound position-0 assignees.
    pub load: u32,
}

/// Weighted cost of sending one vehicle to one station.
pub fn pair_cost(vehicle: &VehicleBid, station: &StationOffer, params: &SimParams) -> f64 {
    params.distance_weight * f64::from(vehicle.coord.manhattan(station.coord))
        + params.battery_weight * (100.0 - vehicle.battery)
        + params.load_weight * f64::from(station.load)
}

/// Full cost matrix, one row per vehicle, one column per station, padded
/// with virtual columns so every row can be matched.
pub fn cost_matrix(
    vehicles: &[VehicleBid],
    stations: &[StationOffer],
    params: &SimParams,
) -> Vec<Vec<f64>> {
    let columns = stations.len().max(vehicles.len());
    vehicles
        .iter()
        .map(|vehicle| {
            (0..columns)
                .map(|j| match stations.get(j) {
                    Some(station) => pair_cost(vehicle, station, params),
                    None => VIRTUAL_COST,
                })
                .collect()
        })
        .collect()
}

/// Minimum-cost assignment for a rectangular matrix with `rows <= columns`.
/// Returns the matched column for each row. Ties resolve toward lower column
/// indices, so callers get ascending-id determinism by ordering their inputs.
pub fn solve(cost: &[Vec<f64>]) -> Vec<usize> {
    let rows = cost.len();
    if rows == 0 {
        return Vec::new();
    }
    let columns = cost[0].len();
    debug_assert!(rows <= columns, "matrix must be padded to rows <= columns");
    debug_assert!(cost.iter().all(|row| row.len() == columns));

    // Potentials over rows (u) and columns (v); matched_row[j] holds the row
    // assigned to column j, 1-based with 0 meaning unmatched.
    let mut u = vec![0.0_f64; rows + 1];
    let mut v = vec![0.0_f64; columns + 1];
    let mut matched_row = vec![0_usize; columns + 1];
    let mut way = vec![0_usize; columns + 1];

    for row in 1..=rows {
        matched_row[0] = row;
        let mut j0 = 0_usize;
        let mut min_to = vec![f64::INFINITY; columns + 1];
        let mut used = vec![false; columns + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=columns {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < min_to[j] {
                    min_to[j] = reduced;
                    way[j] = j0;
                }
                if min_to[j] < delta {
                    delta = min_to[j];
                    j1 = j;
                }
            }

            for j in 0..=columns {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_to[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path back to the virtual column 0.
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![usize::MAX; rows];
    for j in 1..=columns {
        if matched_row[j] != 0 {
            result[matched_row[j] - 1] = j - 1;
        }
    }
    result
}

/// Total cost of a row -> column matching.
pub fn matching_cost(cost: &[Vec<f64>], matching: &[usize]) -> f64 {
    matching
        .iter()
        .enumerate()
        .map(|(row, &column)| cost[row][column])
        .sum()
}
