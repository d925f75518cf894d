//! Thin command-line controller over `journey_core`.
//!
//! # Responsibility
//! - Parse arguments, load the engine config and open the journey store.
//! - Print read models and outcomes as JSON on stdout.
//! - Commands that address an existing journey need `database_path`; only
//!   `materialize --draft` may run against a throwaway in-memory store.
//! - Map service failures to exit codes: 2 precondition, 3 not found,
//!   4 storage, 1 usage or config.

use chrono::{DateTime, Utc};
use journey_core::db::{open_db, open_db_in_memory};
use journey_core::{
    init_logging, EngineConfig, ErrorKind, JourneyDraft, JourneyTimelineService, PlanSkeleton,
    TimelineServiceError,
};
use log::info;
use rusqlite::Connection;
use std::path::Path;
use std::process::ExitCode;
use uuid::Uuid;

const USAGE: &str = "usage:
  journey_cli ping
  journey_cli materialize <config.json> <plan.json> (--journey <uuid> | --draft <draft.json>)
  journey_cli rescale <config.json> <journey-uuid> <start-rfc3339> <end-rfc3339>
  journey_cli add-day <config.json> <journey-uuid>
  journey_cli timeline <config.json> <journey-uuid>";

/// Whether a command may fall back to an in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    Persistent,
    AllowEphemeral,
}

#[derive(Debug)]
enum CliError {
    Usage(String),
    Service(TimelineServiceError),
}

impl From<TimelineServiceError> for CliError {
    fn from(value: TimelineServiceError) -> Self {
        Self::Service(value)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
        Err(CliError::Service(err)) => {
            eprintln!("{err}");
            let code = match err.kind() {
                ErrorKind::Precondition => 2,
                ErrorKind::NotFound => 3,
                ErrorKind::Storage => 4,
            };
            ExitCode::from(code)
        }
    }
}

fn run(args: &[String]) -> Result<(), CliError> {
    let Some(command) = args.first() else {
        return Err(CliError::Usage(USAGE.to_string()));
    };

    match (command.as_str(), &args[1..]) {
        ("ping", []) => {
            println!("journey_core ping={}", journey_core::ping());
            println!("journey_core version={}", journey_core::core_version());
            Ok(())
        }
        ("materialize", [config, plan, flag, value]) => {
            let skeleton: PlanSkeleton = read_json(plan)?;
            let (journey_id, draft) = match flag.as_str() {
                "--journey" => (Some(parse_uuid(value)?), None),
                "--draft" => (None, Some(read_json::<JourneyDraft>(value)?)),
                other => return Err(CliError::Usage(format!("unknown flag `{other}`\n{USAGE}"))),
            };
            let store = if journey_id.is_some() {
                Store::Persistent
            } else {
                Store::AllowEphemeral
            };
            with_service(config, store, |service| {
                let id = service.materialize_plan(journey_id, &skeleton, draft.as_ref())?;
                print_json(&service.journey_timeline(id)?)
            })
        }
        ("rescale", [config, journey, start, end]) => {
            let journey_id = parse_uuid(journey)?;
            let (start, end) = (parse_instant(start)?, parse_instant(end)?);
            with_service(config, Store::Persistent, |service| {
                let outcome = service.rescale_window(journey_id, start, end)?;
                info!(
                    "event=cli_rescale module=cli status=ok days_added={} days_removed={}",
                    outcome.days_added, outcome.days_removed
                );
                print_json(&service.journey_timeline(journey_id)?)
            })
        }
        ("add-day", [config, journey]) => {
            let journey_id = parse_uuid(journey)?;
            with_service(config, Store::Persistent, |service| {
                let day_id = service.add_day(journey_id)?;
                println!("{day_id}");
                Ok(())
            })
        }
        ("timeline", [config, journey]) => {
            let journey_id = parse_uuid(journey)?;
            with_service(config, Store::Persistent, |service| {
                print_json(&service.journey_timeline(journey_id)?)
            })
        }
        _ => Err(CliError::Usage(USAGE.to_string())),
    }
}

fn with_service<F>(config_path: &str, store: Store, work: F) -> Result<(), CliError>
where
    F: FnOnce(&mut JourneyTimelineService<'_>) -> Result<(), CliError>,
{
    let config = EngineConfig::from_file(config_path)
        .map_err(|err| CliError::Usage(err.to_string()))?;
    init_logging(&config).map_err(|err| CliError::Usage(err.to_string()))?;
    let calendar = config
        .calendar()
        .map_err(|err| CliError::Usage(err.to_string()))?;

    let mut conn = open_store(config.database_path.as_deref(), store)?;
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar)?;
    work(&mut service)
}

fn open_store(path: Option<&Path>, store: Store) -> Result<Connection, CliError> {
    let opened = match (path, store) {
        (Some(path), _) => open_db(path),
        (None, Store::AllowEphemeral) => open_db_in_memory(),
        (None, Store::Persistent) => {
            return Err(CliError::Usage(
                "config must set `database_path` for commands on an existing journey".to_string(),
            ))
        }
    };
    opened.map_err(|err| CliError::Usage(format!("failed to open journey store: {err}")))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| CliError::Usage(format!("failed to read `{path}`: {err}")))?;
    serde_json::from_str(&raw)
        .map_err(|err| CliError::Usage(format!("invalid JSON in `{path}`: {err}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Usage(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn parse_uuid(value: &str) -> Result<Uuid, CliError> {
    Uuid::parse_str(value).map_err(|err| CliError::Usage(format!("invalid id `{value}`: {err}")))
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| CliError::Usage(format!("invalid instant `{value}`: {err}")))
}
