use std::collections::BTreeSet;

use contracts::{
    Behavior, Coord, RunMode, RunOutcome, ScenarioConfig, SimParams, StationSpec, VehicleSpec,
    VehicleState, SCHEMA_VERSION_V1,
};

use super::{ConfigError, FleetWorld};
use crate::scenario;

fn tiny_config() -> ScenarioConfig {
    ScenarioConfig {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        run_id: "run_tiny".to_string(),
        name: "tiny".to_string(),
        description: String::new(),
        seed: 7,
        map: vec![
            "......".to_string(),
            "......".to_string(),
            "......".to_string(),
            "......".to_string(),
        ],
        stations: vec![StationSpec {
            coord: Coord::new(4, 1),
            capacity: 1,
        }],
        exit: Coord::new(0, 3),
        vehicles: vec![VehicleSpec {
            start: Coord::new(1, 1),
            battery: 25.0,
            behavior: Behavior::None,
        }],
        params: SimParams {
            max_steps: 120,
            ..SimParams::default()
        },
        expected_outcome: None,
    }
}

#[test]
fn invalid_vehicle_start_is_a_config_error() {
    let mut config = tiny_config();
    config.map[1] = ".#....".to_string();
    let err = FleetWorld::new(config).unwrap_err();
    assert!(matches!(err, ConfigError::StartNotWalkable { vehicle: 0, .. }));
}

#[test]
fn duplicate_starts_are_rejected() {
    let mut config = tiny_config();
    config.vehicles.push(VehicleSpec {
        start: Coord::new(1, 1),
        battery: 50.0,
        behavior: Behavior::None,
    });
    let err = FleetWorld::new(config).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateStart { .. }));
}

#[test]
fn walled_off_exit_is_a_config_error() {
    let mut config = tiny_config();
    // Wall off the left column holding the exit.
    config.map = vec![
        ".#....".to_string(),
        ".#....".to_string(),
        ".#....".to_string(),
        ".#....".to_string(),
    ];
    config.vehicles[0].start = Coord::new(2, 1);
    let err = FleetWorld::new(config).unwrap_err();
    assert!(matches!(err, ConfigError::UnreachableExit { .. }));
}

#[test]
fn single_vehicle_charges_and_completes() {
    let mut world = FleetWorld::new(tiny_config()).expect("valid config");
    world.start();
    let committed = world.run_until_complete();

    assert!(committed > 0);
    assert_eq!(world.status().outcome, Some(RunOutcome::AllCompleted));
    assert_eq!(world.status().mode, RunMode::Paused);

    let vehicle = world.vehicles().get(&0).expect("vehicle exists");
    assert_eq!(vehicle.state, VehicleState::Completed);
    // Charged to target, minus the drain spent walking to the exit.
    assert!(vehicle.battery > 85.0);
    assert_eq!(vehicle.coord, world.grid().exit());
}

#[test]
fn battery_exhaustion_strands_the_vehicle() {
    let mut config = tiny_config();
    config.vehicles[0].battery = 1.0;
    let mut world = FleetWorld::new(config).expect("valid config");
    world.start();
    world.run_until_complete();

    assert_eq!(world.status().outcome, Some(RunOutcome::SomeStranded));
    let vehicle = world.vehicles().get(&0).expect("vehicle exists");
    assert_eq!(vehicle.state, VehicleState::Stranded);
    assert_eq!(vehicle.battery, 0.0);
}

#[test]
fn step_cap_times_out_with_unfinished_vehicles() {
    let mut config = tiny_config();
    config.params.max_steps = 3;
    let mut world = FleetWorld::new(config).expect("valid config");
    world.start();
    let committed = world.run_until_complete();

    assert_eq!(committed, 3);
    assert_eq!(world.status().outcome, Some(RunOutcome::TimedOut));
    assert!(!world.step_tick());
}

#[test]
fn identical_configs_produce_identical_snapshot_streams() {
    let config = scenario::by_name("contention").expect("preset");
    let mut first = FleetWorld::new(config.clone()).expect("valid config");
    let mut second = FleetWorld::new(config).expect("valid config");
    first.start();
    second.start();

    for _ in 0..80 {
        let a = first.step_tick();
        let b = second.step_tick();
        assert_eq!(a, b);

        let snap_a = serde_json::to_string(&first.snapshot_for_current_tick()).expect("serialize");
        let snap_b = serde_json::to_string(&second.snapshot_for_current_tick()).expect("serialize");
        assert_eq!(snap_a, snap_b);
        assert_eq!(first.state_hash(), second.state_hash());
        if !a {
            break;
        }
    }
}

#[test]
fn per_tick_invariants_hold_for_contention_preset() {
    let config = scenario::by_name("contention").expect("preset");
    let mut world = FleetWorld::new(config).expect("valid config");
    world.start();

    for _ in 0..world.config().params.max_steps {
        if !world.step_tick() {
            break;
        }

        // No two live vehicles share a cell.
        let mut cells = BTreeSet::new();
        for vehicle in world.vehicles().values() {
            assert!((0.0..=100.0).contains(&vehicle.battery));
            if vehicle.state == VehicleState::Completed {
                continue;
            }
            assert!(
                cells.insert(vehicle.coord),
                "two vehicles at {}",
                vehicle.coord
            );
        }

        for station in world.stations() {
            assert!(station.occupants.len() as u32 <= station.capacity);
            for occupant in &station.occupants {
                assert!(!station.queue.contains(occupant));
            }
        }

        // A charging vehicle is on its station cell and counted there.
        for vehicle in world.vehicles().values() {
            if vehicle.state == VehicleState::Charging {
                let station_id = vehicle.assigned_station.expect("charging implies assignment");
                let station = world
                    .stations()
                    .iter()
                    .find(|station| station.id == station_id)
                    .expect("assigned station exists");
                assert_eq!(vehicle.coord, station.coord);
                assert!(station.occupants.contains(&vehicle.id));
            }
        }

        // One vehicle per reservation slot, by construction of the table's
        // secondary index.
        for vehicle in world.vehicles().values() {
            for (tick, coord) in world.reservations().slots_for(vehicle.id) {
                assert_eq!(world.reservations().is_reserved(tick, coord), Some(vehicle.id));
            }
        }
    }

    assert_eq!(world.status().outcome, Some(RunOutcome::AllCompleted));
}

#[test]
fn queue_positions_shrink_monotonically_without_disputes() {
    // Batteries stay above the critical threshold long enough that nobody
    // counter-proposes; queue positions must then never grow.
    let mut config = scenario::by_name("contention").expect("preset");
    config.vehicles[0].battery = 29.0;
    config.vehicles[1].battery = 28.0;
    config.vehicles[2].battery = 27.0;
    let mut world = FleetWorld::new(config).expect("valid config");
    world.start();

    let mut last_pos: Vec<Option<u32>> = vec![None; 3];
    for _ in 0..world.config().params.max_steps {
        if !world.step_tick() {
            break;
        }
        let snapshot = world.snapshot_for_current_tick();
        assert_eq!(snapshot.metrics.counter_proposals, 0);
        for vehicle in &snapshot.vehicles {
            if vehicle.state == VehicleState::Charging {
                continue;
            }
            if let (Some(previous), Some(current)) =
                (last_pos[vehicle.id as usize], vehicle.queue_pos)
            {
                assert!(
                    current <= previous,
                    "queue position of vehicle {} grew from {previous} to {current}",
                    vehicle.id
                );
            }
            last_pos[vehicle.id as usize] = vehicle.queue_pos;
        }
    }
    assert_eq!(world.status().outcome, Some(RunOutcome::AllCompleted));
}

#[test]
fn rebuilding_from_the_same_config_resets_to_the_initial_snapshot() {
    let config = scenario::by_name("single_vehicle").expect("preset");
    let world = FleetWorld::new(config.clone()).expect("valid config");
    let initial = serde_json::to_string(&world.snapshot_for_current_tick()).expect("serialize");

    let mut stepped = FleetWorld::new(config.clone()).expect("valid config");
    stepped.start();
    stepped.step_n(5);
    assert_ne!(
        serde_json::to_string(&stepped.snapshot_for_current_tick()).expect("serialize"),
        initial
    );

    let rebuilt = FleetWorld::new(config).expect("valid config");
    assert_eq!(
        serde_json::to_string(&rebuilt.snapshot_for_current_tick()).expect("serialize"),
        initial
    );
}

#[test]
fn stationary_vehicles_keep_their_cells_reserved() {
    let mut world = FleetWorld::new(tiny_config()).expect("valid config");
    world.start();
    world.step_tick();

    // After the first tick the (still mostly stationary) vehicle holds a
    // claim on its own cell for the next tick.
    let vehicle = world.vehicles().get(&0).expect("vehicle exists");
    if !vehicle.state.is_terminal() && vehicle.path.is_empty() {
        assert_eq!(
            world
                .reservations()
                .is_reserved(world.status().current_tick, vehicle.coord),
            Some(0)
        );
    }
}
