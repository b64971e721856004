//! Built-in scenario presets.
//!
//! Each preset is a complete [`ScenarioConfig`] with its own grid, fleet,
//! parameters, and an expected-outcome oracle used by tests and the UI.
//! Custom scenarios come in as JSON through the same type.

use contracts::{Behavior, Coord, ScenarioConfig, SimParams, StationSpec, VehicleSpec,
    SCHEMA_VERSION_V1};

pub const SCENARIO_NAMES: [&str; 6] = [
    "single_vehicle",
    "three_vehicles",
    "corridor",
    "contention",
    "negotiation",
    "tournament",
];

pub fn by_name(name: &str) -> Option<ScenarioConfig> {
    match name {
        "single_vehicle" => Some(single_vehicle()),
        "three_vehicles" => Some(three_vehicles()),
        "corridor" => Some(corridor()),
        "contention" => Some(contention()),
        "negotiation" => Some(negotiation()),
        "tournament" => Some(tournament()),
        _ => None,
    }
}

/// (name, description) pairs for every preset, in registry order.
pub fn catalog() -> Vec<(String, String)> {
    SCENARIO_NAMES
        .iter()
        .filter_map(|name| by_name(name))
        .map(|config| (config.name, config.description))
        .collect()
}

fn open_map(width: usize, height: usize) -> Vec<String> {
    vec![".".repeat(width); height]
}

fn set_obstacle(map: &mut [String], coord: Coord) {
    let row = &mut map[coord.y as usize];
    let mut chars: Vec<char> = row.chars().collect();
    chars[coord.x as usize] = '#';
    *row = chars.into_iter().collect();
}

fn base(
    name: &str,
    description: &str,
    map: Vec<String>,
    stations: Vec<StationSpec>,
    exit: Coord,
    vehicles: Vec<VehicleSpec>,
    params: SimParams,
    expected_outcome: &str,
) -> ScenarioConfig {
    ScenarioConfig {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id: format!("run_{name}"),
        name: name.to_string(),
        description: description.to_string(),
        seed: 1337,
        map,
        stations,
        exit,
        vehicles,
        params,
        expected_outcome: Some(expected_outcome.to_string()),
    }
}

fn vehicle(x: i32, y: i32, battery: f64) -> VehicleSpec {
    VehicleSpec {
        start: Coord::new(x, y),
        battery,
        behavior: Behavior::None,
    }
}

fn station(x: i32, y: i32, capacity: u32) -> StationSpec {
    StationSpec {
        coord: Coord::new(x, y),
        capacity,
    }
}

/// One low-battery vehicle, two roomy stations. The nearest station wins.
pub fn single_vehicle() -> ScenarioConfig {
    let mut map = open_map(15, 12);
    set_obstacle(&mut map, Coord::new(3, 3));
    set_obstacle(&mut map, Coord::new(3, 4));

    base(
        "single_vehicle",
        "One vehicle, two stations with ample capacity",
        map,
        vec![station(5, 5, 2), station(10, 6, 2)],
        Coord::new(0, 11),
        vec![vehicle(12, 1, 25.0)],
        SimParams {
            max_steps: 150,
            ..SimParams::default()
        },
        "assigned the nearest station (id 1), charges to target, reaches the exit",
    )
}

/// Three vehicles, three unit stations: optimal assignment pairs each
/// vehicle with its closest station.
pub fn three_vehicles() -> ScenarioConfig {
    base(
        "three_vehicles",
        "Three vehicles matched to three unit-capacity stations by proximity",
        open_map(20, 16),
        vec![station(5, 5, 1), station(14, 5, 1), station(10, 12, 1)],
        Coord::new(0, 15),
        vec![
            vehicle(2, 2, 28.0),
            vehicle(17, 2, 26.0),
            vehicle(10, 8, 24.0),
        ],
        SimParams {
            max_steps: 250,
            ..SimParams::default()
        },
        "proximity pairing, all complete with minimal yielding",
    )
}

/// Two vehicles meet in a two-row corridor; the higher id yields.
pub fn corridor() -> ScenarioConfig {
    let mut map = Vec::with_capacity(10);
    for y in 0..10 {
        if y == 2 || y == 3 {
            map.push(".".repeat(9));
        } else {
            map.push("#".repeat(9));
        }
    }

    base(
        "corridor",
        "Head-on traffic in a two-wide corridor",
        map,
        vec![station(2, 2, 1), station(6, 2, 1)],
        Coord::new(8, 3),
        vec![vehicle(0, 2, 26.0), vehicle(8, 2, 17.0)],
        SimParams {
            max_steps: 200,
            ..SimParams::default()
        },
        "both charge; vehicle 1 yields at least once on the shared exit route",
    )
}

/// Three vehicles share one unit-capacity station and serialize through its
/// queue.
pub fn contention() -> ScenarioConfig {
    base(
        "contention",
        "Three vehicles, one station, strict queueing",
        open_map(12, 10),
        vec![station(6, 4, 1)],
        Coord::new(0, 9),
        vec![
            vehicle(3, 1, 28.0),
            vehicle(10, 1, 26.0),
            vehicle(6, 7, 24.0),
        ],
        SimParams {
            drain_per_step: 0.1,
            max_steps: 400,
            ..SimParams::default()
        },
        "exactly one charges at a time; queue positions 0, 1, 2 all observed; everyone completes",
    )
}

/// A critical-battery vehicle counter-proposes and charges first.
pub fn negotiation() -> ScenarioConfig {
    base(
        "negotiation",
        "Urgency negotiation swaps the queue head",
        open_map(15, 12),
        vec![station(6, 4, 1)],
        Coord::new(0, 11),
        vec![vehicle(2, 2, 25.0), vehicle(10, 2, 15.0)],
        SimParams {
            drain_per_step: 0.1,
            max_steps: 300,
            ..SimParams::default()
        },
        "vehicle 1 disputes its queue slot and charges before vehicle 0",
    )
}

/// Cooperative, competitive, and tit-for-tat vehicles contend for one slot.
pub fn tournament() -> ScenarioConfig {
    let mut config = base(
        "tournament",
        "Behavioral tournament at a single station",
        open_map(12, 10),
        vec![station(6, 5, 1)],
        Coord::new(0, 9),
        vec![
            vehicle(6, 2, 22.0),
            vehicle(2, 5, 22.0),
            vehicle(11, 8, 22.0),
        ],
        SimParams {
            drain_per_step: 0.1,
            max_steps: 500,
            ..SimParams::default()
        },
        "tit-for-tat opens nice, retaliates after the competitive vehicle defects, stays nice to the cooperator",
    );
    config.vehicles[0].behavior = Behavior::Cooperative;
    config.vehicles[1].behavior = Behavior::Competitive;
    config.vehicles[2].behavior = Behavior::TitForTat;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::FleetWorld;

    #[test]
    fn every_preset_builds_a_world() {
        for name in SCENARIO_NAMES {
            let config = by_name(name).expect("preset exists");
            assert_eq!(config.name, name);
            FleetWorld::new(config).expect("preset is a valid scenario");
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(by_name("does_not_exist").is_none());
    }

    #[test]
    fn catalog_lists_all_presets_in_order() {
        let catalog = catalog();
        assert_eq!(catalog.len(), SCENARIO_NAMES.len());
        assert_eq!(catalog[0].0, "single_vehicle");
        assert!(!catalog[0].1.is_empty());
    }

    #[test]
    fn corridor_map_is_two_rows_wide() {
        let config = corridor();
        assert_eq!(config.map[2], ".".repeat(9));
        assert_eq!(config.map[3], ".".repeat(9));
        assert_eq!(config.map[4], "#".repeat(9));
    }
}
