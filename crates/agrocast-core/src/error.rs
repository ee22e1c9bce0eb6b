//! Top-level error type for a simulation run.
//!
//! [`SimulationError`] wraps every subsystem error so the orchestrator and
//! the components can propagate with `?`. Setup errors (rules, stage
//! sequences) surface before the first day is stepped; driver and feed
//! errors name the offending day.

use chrono::NaiveDate;

use crate::bus::BusError;
use crate::phenology::PhenologyError;
use crate::registry::RegistryError;
use crate::rules::RuleError;
use crate::weather_feed::DriverError;

/// Errors that end a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Shared state access failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// Signal delivery failed.
    #[error("signal bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: BusError,
    },

    /// The phenology configuration is invalid.
    #[error("phenology error: {source}")]
    Phenology {
        /// The underlying phenology error.
        #[from]
        source: PhenologyError,
    },

    /// An alert rule could not be built.
    #[error("rule error: {source}")]
    Rule {
        /// The underlying rule error.
        #[from]
        source: RuleError,
    },

    /// A weather record failed validation.
    #[error("weather driver error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: DriverError,
    },

    /// The weather feed has no record for a day inside its own range.
    #[error("no weather record for {day}")]
    MissingWeather {
        /// The day without a record.
        day: NaiveDate,
    },

    /// The feed does not reach past the start day.
    #[error("weather feed ends on {last}, nothing to simulate after {start}")]
    EmptyRange {
        /// Requested start day.
        start: NaiveDate,
        /// Last day the feed covers.
        last: NaiveDate,
    },

    /// The time step must be at least one day.
    #[error("invalid time step of {step} days")]
    InvalidStep {
        /// The rejected step.
        step: u32,
    },

    /// Calendar arithmetic left the representable date range.
    #[error("date arithmetic overflow after {day}")]
    DateOverflow {
        /// The day the overflowing step started from.
        day: NaiveDate,
    },
}
