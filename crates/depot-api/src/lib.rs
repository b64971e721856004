//! In-process API facade over the simulation kernel, plus the HTTP server.
//!
//! `EngineApi` validates commands, drives the world, and keeps an audit
//! trail. The server module exposes the same surface over HTTP and streams
//! tick-aligned snapshots to WebSocket clients.

mod server;

use std::fmt;

use contracts::{
    ApiError, Command, CommandPayload, CommandResult, CommandType, ErrorCode, RunStatus,
    ScenarioConfig, Snapshot, SCHEMA_VERSION_V1,
};
use depot_core::scenario;
use depot_core::{ConfigError, FleetWorld};

pub use server::{serve, ServerError};

#[derive(Debug)]
pub enum EngineError {
    ScenarioUnknown(String),
    Config(ConfigError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScenarioUnknown(name) => write!(f, "unknown scenario: {name}"),
            Self::Config(err) => write!(f, "invalid scenario config: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

#[derive(Debug)]
pub struct EngineApi {
    world: FleetWorld,
    initial_config: ScenarioConfig,
    command_audit: Vec<CommandResult>,
}

impl EngineApi {
    pub fn from_config(config: ScenarioConfig) -> Result<Self, EngineError> {
        let world = FleetWorld::new(config.clone())?;
        Ok(Self {
            world,
            initial_config: config,
            command_audit: Vec::new(),
        })
    }

    pub fn from_scenario(name: &str) -> Result<Self, EngineError> {
        let config =
            scenario::by_name(name).ok_or_else(|| EngineError::ScenarioUnknown(name.to_string()))?;
        Self::from_config(config)
    }

    pub fn run_id(&self) -> &str {
        self.world.run_id()
    }

    pub fn config(&self) -> &ScenarioConfig {
        self.world.config()
    }

    pub fn status(&self) -> &RunStatus {
        self.world.status()
    }

    pub fn snapshot_for_current_tick(&self) -> Snapshot {
        self.world.snapshot_for_current_tick()
    }

    pub fn start(&mut self) -> &RunStatus {
        self.world.start();
        self.world.status()
    }

    pub fn pause(&mut self) -> &RunStatus {
        self.world.pause();
        self.world.status()
    }

    pub fn step(&mut self, steps: u64) -> (&RunStatus, u64) {
        let committed = self.world.step_n(steps.max(1));
        (self.world.status(), committed)
    }

    pub fn run_to_tick(&mut self, tick: u64) -> (&RunStatus, u64) {
        let committed = self.world.run_to_tick(tick);
        (self.world.status(), committed)
    }

    pub fn run_until_complete(&mut self) -> (&RunStatus, u64) {
        let committed = self.world.run_until_complete();
        (self.world.status(), committed)
    }

    /// Rebuilds the world from the initial configuration. `start(s); step();
    /// reset()` yields the same snapshot as a fresh `start(s)`.
    pub fn reset(&mut self) -> Result<&RunStatus, EngineError> {
        self.world = FleetWorld::new(self.initial_config.clone())?;
        Ok(self.world.status())
    }

    pub fn command_audit(&self) -> &[CommandResult] {
        &self.command_audit
    }

    pub fn submit_command(&mut self, command: Command) -> CommandResult {
        let result = match self.validate_command(&command) {
            Some(error) => CommandResult::rejected(&command, error),
            None => match self.apply_command(&command) {
                Ok(()) => CommandResult::accepted(&command),
                Err(error) => CommandResult::rejected(&command, error),
            },
        };
        self.command_audit.push(result.clone());
        result
    }

    fn apply_command(&mut self, command: &Command) -> Result<(), ApiError> {
        match &command.payload {
            CommandPayload::SimStart => {
                self.world.start();
            }
            CommandPayload::SimPause => {
                self.world.pause();
            }
            CommandPayload::SimStepTick { steps } => {
                self.world.step_n(*steps);
            }
            CommandPayload::SimRunToTick { target_tick } => {
                self.world.run_to_tick(*target_tick);
            }
            CommandPayload::SimReset => {
                self.reset().map_err(|err| {
                    ApiError::new(ErrorCode::InternalError, "reset failed", Some(err.to_string()))
                })?;
            }
        }
        Ok(())
    }

    fn validate_command(&self, command: &Command) -> Option<ApiError> {
        if command.schema_version != SCHEMA_VERSION_V1 {
            return Some(ApiError::new(
                ErrorCode::ContractVersionUnsupported,
                "Unsupported schema_version",
                Some(format!(
                    "got={} expected={}",
                    command.schema_version, SCHEMA_VERSION_V1
                )),
            ));
        }

        if command.run_id != self.world.run_id() {
            return Some(ApiError::new(
                ErrorCode::RunNotFound,
                "command.run_id does not match active run",
                None,
            ));
        }

        if !command_type_matches_payload(command.command_type, &command.payload) {
            return Some(ApiError::new(
                ErrorCode::InvalidCommand,
                "command_type does not match payload variant",
                None,
            ));
        }

        match &command.payload {
            CommandPayload::SimStepTick { steps } if *steps == 0 => {
                return Some(ApiError::new(
                    ErrorCode::InvalidCommand,
                    "sim.step_tick requires steps >= 1",
                    None,
                ))
            }
            CommandPayload::SimRunToTick { target_tick }
                if *target_tick <= self.world.status().current_tick =>
            {
                return Some(ApiError::new(
                    ErrorCode::TickOutOfRange,
                    "target_tick must be in the future",
                    Some(format!(
                        "target_tick={} current_tick={}",
                        target_tick,
                        self.world.status().current_tick
                    )),
                ))
            }
            _ => {}
        }

        None
    }
}

fn command_type_matches_payload(command_type: CommandType, payload: &CommandPayload) -> bool {
    matches!(
        (command_type, payload),
        (CommandType::SimStart, CommandPayload::SimStart)
            | (CommandType::SimPause, CommandPayload::SimPause)
            | (CommandType::SimStepTick, CommandPayload::SimStepTick { .. })
            | (
                CommandType::SimRunToTick,
                CommandPayload::SimRunToTick { .. }
            )
            | (CommandType::SimReset, CommandPayload::SimReset)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> EngineApi {
        EngineApi::from_scenario("single_vehicle").expect("preset exists")
    }

    #[test]
    fn step_returns_committed_count() {
        let mut api = api();
        api.start();
        let (status, committed) = api.step(3);
        assert_eq!(committed, 3);
        assert_eq!(status.current_tick, 3);
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        let err = EngineApi::from_scenario("missing").unwrap_err();
        assert!(matches!(err, EngineError::ScenarioUnknown(_)));
    }

    #[test]
    fn rejects_mismatched_payload_type() {
        let mut api = api();
        let run_id = api.run_id().to_string();
        let bad = Command::new(
            "cmd_bad",
            run_id,
            0,
            CommandType::SimStart,
            CommandPayload::SimStepTick { steps: 2 },
        );
        let result = api.submit_command(bad);
        assert!(!result.accepted);
        assert_eq!(
            result.error.expect("rejection has error").error_code,
            ErrorCode::InvalidCommand
        );
    }

    #[test]
    fn rejects_zero_steps() {
        let mut api = api();
        let run_id = api.run_id().to_string();
        let command = Command::new(
            "cmd_zero",
            run_id,
            0,
            CommandType::SimStepTick,
            CommandPayload::SimStepTick { steps: 0 },
        );
        assert!(!api.submit_command(command).accepted);
    }

    #[test]
    fn rejects_foreign_run_id() {
        let mut api = api();
        let command = Command::new(
            "cmd_foreign",
            "run_other",
            0,
            CommandType::SimStart,
            CommandPayload::SimStart,
        );
        let result = api.submit_command(command);
        assert_eq!(
            result.error.expect("rejection has error").error_code,
            ErrorCode::RunNotFound
        );
    }

    #[test]
    fn accepted_commands_drive_the_world() {
        let mut api = api();
        let run_id = api.run_id().to_string();
        let start = Command::new(
            "cmd_start",
            run_id.clone(),
            0,
            CommandType::SimStart,
            CommandPayload::SimStart,
        );
        assert!(api.submit_command(start).accepted);

        let step = Command::new(
            "cmd_step",
            run_id,
            0,
            CommandType::SimStepTick,
            CommandPayload::SimStepTick { steps: 4 },
        );
        assert!(api.submit_command(step).accepted);
        assert_eq!(api.status().current_tick, 4);
        assert_eq!(api.command_audit().len(), 2);
    }

    #[test]
    fn reset_restores_the_initial_snapshot() {
        let mut api = api();
        let initial =
            serde_json::to_string(&api.snapshot_for_current_tick()).expect("serialize");

        api.start();
        api.step(6);
        assert_ne!(
            serde_json::to_string(&api.snapshot_for_current_tick()).expect("serialize"),
            initial
        );

        api.reset().expect("reset succeeds");
        assert_eq!(
            serde_json::to_string(&api.snapshot_for_current_tick()).expect("serialize"),
            initial
        );
    }
}
