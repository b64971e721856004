//! 4-connected A* over the grid, unit step cost, Manhattan heuristic.
//!
//! Tie-breaking is fully deterministic: lower f wins, then lower h, then
//! insertion order (which follows the grid's fixed neighbor probe order).

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use contracts::Coord;

use crate::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenEntry {
    f: u32,
    h: u32,
    seq: u64,
    coord: Coord,
}

/// Shortest path from `start` to `goal`, inclusive of both endpoints.
///
/// `blocked` cells are treated as obstacles except for the goal itself, so a
/// vehicle can still route to a contested station cell and queue next to it.
/// Returns `None` when the goal is unreachable.
pub fn plan(start: Coord, goal: Coord, grid: &Grid, blocked: &BTreeSet<Coord>) -> Option<Vec<Coord>> {
    if !grid.is_walkable(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut open = BinaryHeap::new();
    let mut g_scores: BTreeMap<Coord, u32> = BTreeMap::new();
    let mut came_from: BTreeMap<Coord, Coord> = BTreeMap::new();
    let mut closed: BTreeSet<Coord> = BTreeSet::new();
    let mut seq = 0_u64;

    g_scores.insert(start, 0);
    let h0 = start.manhattan(goal);
    open.push(Reverse(OpenEntry {
        f: h0,
        h: h0,
        seq,
        coord: start,
    }));

    while let Some(Reverse(entry)) = open.pop() {
        let current = entry.coord;
        if !closed.insert(current) {
            continue;
        }
        if current == goal {
            return Some(reconstruct(&came_from, current));
        }

        let current_g = g_scores[&current];
        for neighbor in grid.neighbors4(current) {
            if closed.contains(&neighbor) {
                continue;
            }
            if blocked.contains(&neighbor) && neighbor != goal {
                continue;
            }
            let tentative_g = current_g + 1;
            if g_scores
                .get(&neighbor)
                .map_or(true, |&known| tentative_g < known)
            {
                g_scores.insert(neighbor, tentative_g);
                came_from.insert(neighbor, current);
                let h = neighbor.manhattan(goal);
                seq += 1;
                open.push(Reverse(OpenEntry {
                    f: tentative_g + h,
                    h,
                    seq,
                    coord: neighbor,
                }));
            }
        }
    }

    None
}

fn reconstruct(came_from: &BTreeMap<Coord, Coord>, mut current: Coord) -> Vec<Coord> {
    let mut path = vec![current];
    while let Some(&previous) = came_from.get(&current) {
        current = previous;
        path.push(current);
    }
    path.reverse();
    path
}
