//! Property tests for the coordination algorithms: planner optimality,
//! assignment optimality, behavioral reciprocity, and run determinism.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use contracts::{Behavior, Coord, PeerAction, SimParams};
use depot_core::assign;
use depot_core::behavior::{self, Decision};
use depot_core::grid::Grid;
use depot_core::planner;
use depot_core::scenario;
use depot_core::vehicle::urgency_score;
use depot_core::FleetWorld;
use proptest::prelude::*;

/// Reference shortest-path length by breadth-first search, counting cells
/// inclusive of both endpoints.
fn bfs_len(grid: &Grid, start: Coord, goal: Coord, blocked: &BTreeSet<Coord>) -> Option<usize> {
    if start == goal {
        return Some(1);
    }
    let mut distances: BTreeMap<Coord, usize> = BTreeMap::new();
    let mut frontier = VecDeque::new();
    distances.insert(start, 1);
    frontier.push_back(start);

    while let Some(current) = frontier.pop_front() {
        let steps = distances[&current];
        for next in grid.neighbors4(current) {
            if blocked.contains(&next) && next != goal {
                continue;
            }
            if distances.contains_key(&next) {
                continue;
            }
            if next == goal {
                return Some(steps + 1);
            }
            distances.insert(next, steps + 1);
            frontier.push_back(next);
        }
    }
    None
}

/// Exhaustive minimum assignment cost over all row -> column injections.
fn brute_force_min(cost: &[Vec<f64>]) -> f64 {
    fn recurse(cost: &[Vec<f64>], row: usize, used: &mut Vec<bool>) -> f64 {
        if row == cost.len() {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        for column in 0..cost[row].len() {
            if used[column] {
                continue;
            }
            used[column] = true;
            let total = cost[row][column] + recurse(cost, row + 1, used);
            used[column] = false;
            if total < best {
                best = total;
            }
        }
        best
    }
    recurse(cost, 0, &mut vec![false; cost[0].len()])
}

fn arbitrary_grid() -> impl Strategy<Value = (Grid, Vec<Coord>)> {
    (4_usize..9, 4_usize..9, proptest::collection::vec(0.0_f64..1.0, 0..12)).prop_map(
        |(width, height, wall_picks)| {
            let mut rows: Vec<String> = vec![".".repeat(width); height];
            let mut walls = Vec::new();
            for pick in wall_picks {
                let index = (pick * (width * height) as f64) as usize % (width * height);
                let (x, y) = (index % width, index / width);
                // Keep corners open so start and goal cells stay walkable.
                if (x, y) == (0, 0) || (x, y) == (width - 1, height - 1) {
                    continue;
                }
                let mut chars: Vec<char> = rows[y].chars().collect();
                chars[x] = '#';
                rows[y] = chars.into_iter().collect();
                walls.push(Coord::new(x as i32, y as i32));
            }
            let (grid, _) = Grid::from_ascii(&rows, &[], Coord::new(0, 0)).expect("valid map");
            (grid, walls)
        },
    )
}

proptest! {
    #[test]
    fn planner_matches_bfs_shortest_path((grid, _) in arbitrary_grid()) {
        let start = Coord::new(0, 0);
        let goal = Coord::new(grid.width() - 1, grid.height() - 1);
        let blocked = BTreeSet::new();

        let planned = planner::plan(start, goal, &grid, &blocked);
        let reference = bfs_len(&grid, start, goal, &blocked);

        match (planned, reference) {
            (Some(path), Some(len)) => {
                prop_assert_eq!(path.len(), len);
                prop_assert_eq!(path[0], start);
                prop_assert_eq!(*path.last().expect("non-empty"), goal);
                for pair in path.windows(2) {
                    prop_assert_eq!(pair[0].manhattan(pair[1]), 1);
                    prop_assert!(grid.is_walkable(pair[1]));
                }
            }
            (None, None) => {}
            (planned, reference) => {
                prop_assert!(false, "planner {:?} disagrees with bfs {:?}", planned.map(|p| p.len()), reference);
            }
        }
    }

    #[test]
    fn hungarian_matches_brute_force(
        rows in 1_usize..5,
        extra_columns in 0_usize..3,
        raw in proptest::collection::vec(0.0_f64..100.0, 25),
    ) {
        let columns = rows + extra_columns;
        let cost: Vec<Vec<f64>> = (0..rows)
            .map(|r| (0..columns).map(|c| raw[(r * columns + c) % raw.len()]).collect())
            .collect();

        let matching = assign::solve(&cost);
        let total = assign::matching_cost(&cost, &matching);
        let best = brute_force_min(&cost);
        prop_assert!((total - best).abs() < 1e-6, "hungarian {total} vs brute force {best}");

        // All assigned columns distinct.
        let distinct: BTreeSet<usize> = matching.iter().copied().collect();
        prop_assert_eq!(distinct.len(), matching.len());
    }

    #[test]
    fn urgency_is_monotonic_in_deficit_and_wait(
        battery_a in 0.0_f64..100.0,
        battery_b in 0.0_f64..100.0,
        waited in 0_u64..50,
    ) {
        let params = SimParams::default();
        let (lower, higher) = if battery_a <= battery_b {
            (battery_a, battery_b)
        } else {
            (battery_b, battery_a)
        };
        prop_assert!(urgency_score(lower, waited, &params) >= urgency_score(higher, waited, &params));
        prop_assert!(urgency_score(lower, waited + 1, &params) > urgency_score(lower, waited, &params));
    }
}

#[test]
fn tit_for_tat_mirrors_the_last_peer_action() {
    let opponent = 7_u32;
    for (last, expected) in [
        (PeerAction::Cooperate, Decision::Accept),
        (PeerAction::Defect, Decision::Dispute),
    ] {
        let mut history = BTreeMap::new();
        history.insert(opponent, vec![PeerAction::Defect, last]);
        let decision = behavior::decide(
            Behavior::TitForTat,
            2,
            50.0,
            20.0,
            Some(opponent),
            &history,
        );
        assert_eq!(decision, expected, "mirror of {last:?}");
    }
}

#[test]
fn full_runs_are_reproducible_across_presets() {
    for name in ["corridor", "negotiation"] {
        let config = scenario::by_name(name).expect("preset");
        let mut first = FleetWorld::new(config.clone()).expect("valid");
        let mut second = FleetWorld::new(config).expect("valid");
        first.start();
        second.start();
        first.run_until_complete();
        second.run_until_complete();

        assert_eq!(first.state_hash(), second.state_hash(), "{name} diverged");
        assert_eq!(
            serde_json::to_string(&first.snapshot_for_current_tick()).expect("serialize"),
            serde_json::to_string(&second.snapshot_for_current_tick()).expect("serialize"),
            "{name} final snapshots differ"
        );
    }
}

#[test]
fn assignment_never_improves_under_pairwise_swaps() {
    // Law: for the computed matching, no swap of two vehicles' stations
    // strictly lowers total cost.
    let params = SimParams::default();
    let vehicles = [
        assign::VehicleBid { coord: Coord::new(2, 2), battery: 28.0 },
        assign::VehicleBid { coord: Coord::new(17, 2), battery: 26.0 },
        assign::VehicleBid { coord: Coord::new(10, 8), battery: 24.0 },
    ];
    let stations = [
        assign::StationOffer { coord: Coord::new(5, 5), load: 0 },
        assign::StationOffer { coord: Coord::new(14, 5), load: 0 },
        assign::StationOffer { coord: Coord::new(10, 12), load: 0 },
    ];
    let cost = assign::cost_matrix(&vehicles, &stations, &params);
    let matching = assign::solve(&cost);
    let total = assign::matching_cost(&cost, &matching);

    for a in 0..matching.len() {
        for b in (a + 1)..matching.len() {
            let mut swapped = matching.clone();
            swapped.swap(a, b);
            assert!(assign::matching_cost(&cost, &swapped) >= total);
        }
    }
}
