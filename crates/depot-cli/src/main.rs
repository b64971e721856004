use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;

use contracts::{RunOutcome, VehicleOutcome};
use depot_api::{serve, EngineApi};
use depot_core::scenario;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_RUNTIME_ERROR: u8 = 2;
const EXIT_TIMED_OUT: u8 = 3;

fn print_usage() {
    println!("depot-cli <command>");
    println!("commands:");
    println!("  scenarios");
    println!("  run <scenario> [--max-steps <n>] [--quiet]");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn list_scenarios() {
    println!("available scenarios:");
    for (name, description) in scenario::catalog() {
        println!("  {name:<16} {description}");
    }
}

fn run_scenario(name: &str, max_steps: Option<u64>, quiet: bool) -> ExitCode {
    let mut config = match scenario::by_name(name) {
        Some(config) => config,
        None => {
            eprintln!("error: unknown scenario: {name}");
            list_scenarios();
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(cap) = max_steps {
        config.params.max_steps = cap;
    }

    let mut api = match EngineApi::from_config(config) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    api.start();
    loop {
        let (status, committed) = api.step(1);
        let finished = status.is_complete();
        if !quiet {
            let snapshot = api.snapshot_for_current_tick();
            // Stepping one tick at a time, the lines stamped with the tick
            // just committed are exactly the new ones.
            let committed_tick = snapshot.tick.saturating_sub(1);
            for line in &snapshot.recent_log {
                if line.tick == committed_tick {
                    println!("[{:>4}] {:<12} {}", line.tick, line.source, line.message);
                }
            }
        }
        if finished || committed == 0 {
            break;
        }
    }

    let snapshot = api.snapshot_for_current_tick();
    println!();
    println!("run {} finished: {}", api.run_id(), api.status());
    println!("ticks: {}", snapshot.metrics.total_ticks);
    for row in &snapshot.metrics.vehicles {
        let outcome = match row.outcome {
            Some(VehicleOutcome::Completed) => "completed",
            Some(VehicleOutcome::Stranded) => "stranded",
            None => "unfinished",
        };
        println!(
            "vehicle_{}: {} (distance {}, charging {} ticks, waiting {} ticks, {} replans, {} yields)",
            row.vehicle_id,
            outcome,
            row.distance_traveled,
            row.ticks_charging,
            row.ticks_waiting,
            row.replans,
            row.yields
        );
    }
    for row in &snapshot.metrics.stations {
        println!(
            "station {}: utilization {:.2}, peak queue {}",
            row.station_id, row.utilization, row.peak_queue
        );
    }
    if let Some(fairness) = snapshot.metrics.fairness_index {
        println!("fairness (Jain over completion ticks): {fairness:.3}");
    }

    match api.status().outcome {
        Some(RunOutcome::AllCompleted) => ExitCode::SUCCESS,
        Some(RunOutcome::SomeStranded) => ExitCode::from(EXIT_RUNTIME_ERROR),
        Some(RunOutcome::TimedOut) | None => ExitCode::from(EXIT_TIMED_OUT),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("scenarios") => {
            list_scenarios();
            ExitCode::SUCCESS
        }
        Some("run") => {
            let Some(name) = args.get(2) else {
                eprintln!("error: missing scenario name");
                print_usage();
                return ExitCode::from(EXIT_CONFIG_ERROR);
            };
            let mut max_steps = None;
            let mut quiet = false;
            let mut index = 3;
            while index < args.len() {
                match args[index].as_str() {
                    "--quiet" => quiet = true,
                    "--max-steps" => {
                        let parsed = args.get(index + 1).and_then(|raw| raw.parse::<u64>().ok());
                        let Some(cap) = parsed else {
                            eprintln!("error: --max-steps needs a positive integer");
                            return ExitCode::from(EXIT_CONFIG_ERROR);
                        };
                        max_steps = Some(cap);
                        index += 1;
                    }
                    other => {
                        eprintln!("error: unknown flag {other}");
                        print_usage();
                        return ExitCode::from(EXIT_CONFIG_ERROR);
                    }
                }
                index += 1;
            }
            run_scenario(name, max_steps, quiet)
        }
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        },
        _ => {
            print_usage();
            ExitCode::SUCCESS
        }
    }
}
