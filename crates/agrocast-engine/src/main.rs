//! Command-line runner for the Agrocast simulation.
//!
//! Loads configuration, reads a scenario file, runs the simulation core and
//! writes the alert document.
//!
//! ```text
//! agrocast-engine <scenario.json> [output.json]
//! ```
//!
//! The output goes to stdout when no output path is given. Logs always go
//! to stderr.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `agrocast-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Read the scenario and resolve its rule tables
//! 4. Run the simulation
//! 5. Write the output document

mod error;
mod output;
mod progress;
mod scenario;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use agrocast_core::Orchestrator;
use agrocast_core::config::{LoggingConfig, SimulationConfig};
use agrocast_types::RunId;
use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::output::OutputDocument;
use crate::progress::LogProgress;
use crate::scenario::Scenario;

/// Configuration file looked up in the working directory.
const CONFIG_FILE: &str = "agrocast-config.yaml";

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    scenario: PathBuf,
    output: Option<PathBuf>,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, EngineError> {
        let scenario = args.next().ok_or_else(|| EngineError::Usage {
            message: "expected <scenario.json> [output.json]".to_owned(),
        })?;
        let output = args.next().map(PathBuf::from);
        if let Some(extra) = args.next() {
            return Err(EngineError::Usage {
                message: format!("unexpected argument {extra:?}"),
            });
        }
        Ok(Self {
            scenario: PathBuf::from(scenario),
            output,
        })
    }
}

fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config().context("loading configuration")?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("agrocast-engine starting");
    info!(
        default_trust_limit_days = config.alerts.default_trust_limit_days,
        per_kind_limits = config.alerts.trust_limit_days.len(),
        step_days = config.run.step_days,
        today = ?config.run.today,
        "Configuration loaded"
    );

    let args = CliArgs::parse(std::env::args().skip(1))?;

    // 3. Read the scenario.
    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let today = config
        .run
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let prepared = scenario.prepare(config.alerts.trust_window(today), config.run.step_days)?;

    // 4. Run the simulation.
    let run_id = RunId::new();
    info!(run_id = %run_id, today = %today, "Running scenario");
    let mut progress = LogProgress::default();
    let result = Orchestrator::new(run_id, prepared.feed, prepared.inputs)?.run(&mut progress)?;

    // 5. Write the output.
    let document = OutputDocument::new(result, prepared.remarks);
    write_output(&document, args.output.as_deref())?;

    info!(
        run_id = %run_id,
        days = progress.days(),
        end_reason = ?document.end_reason,
        "agrocast-engine finished"
    );
    Ok(())
}

/// Load the simulation configuration from `agrocast-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<SimulationConfig, EngineError> {
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        Ok(SimulationConfig::from_file(config_path)?)
    } else {
        // Environment overrides still apply to the defaults.
        Ok(SimulationConfig::parse("")?)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn write_output(document: &OutputDocument, path: Option<&Path>) -> Result<(), EngineError> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(|source| EngineError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            document.write_to(BufWriter::new(file))?;
            info!(path = %path.display(), "Output written");
        }
        None => document.write_to(std::io::stdout().lock())?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|arg| (*arg).to_owned()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn scenario_only_writes_to_stdout() {
        let parsed = CliArgs::parse(args(&["season.json"])).unwrap();
        assert_eq!(parsed.scenario, PathBuf::from("season.json"));
        assert_eq!(parsed.output, None);
    }

    #[test]
    fn output_path_is_optional_second_argument() {
        let parsed = CliArgs::parse(args(&["season.json", "alerts.json"])).unwrap();
        assert_eq!(parsed.output, Some(PathBuf::from("alerts.json")));
    }

    #[test]
    fn missing_or_extra_arguments_are_usage_errors() {
        assert!(matches!(CliArgs::parse(args(&[])), Err(EngineError::Usage { .. })));
        assert!(matches!(
            CliArgs::parse(args(&["a.json", "b.json", "c.json"])),
            Err(EngineError::Usage { .. })
        ));
    }
}
