//! Daily crop phenology and alert simulation engine for Agrocast.
//!
//! This crate steps a crop through its growth stages one day at a time and
//! raises weather-stress and management alerts along the way. Every day runs
//! a rate phase and an integrate phase across three components in a fixed
//! order: phenology, weather alerts, management alerts.
//!
//! # Modules
//!
//! - [`orchestrator`] -- The day-stepping loop, run state, and output
//!   assembly.
//! - [`component`] -- Phase contexts and the [`SimulationComponent`] trait.
//! - [`registry`] -- Per-run shared state with write-once-per-day keys.
//! - [`bus`] -- Synchronous signal bus sealed before the first day.
//! - [`phenology`] -- Stage sequence and thermal-time tracker.
//! - [`thermal`] -- Piecewise-linear thermal response function.
//! - [`daylength`] -- Day length and photoperiod reduction.
//! - [`params`] -- Strict parser for rule-parameter literals.
//! - [`rules`] -- Weather and management rule definitions.
//! - [`weather_alerts`] -- Streak machines and the forecast-trust window.
//! - [`management`] -- One-shot stage-triggered alerts.
//! - [`weather_feed`] -- [`WeatherFeed`] trait and the in-memory series.
//! - [`config`] -- Configuration loading from `agrocast-config.yaml`.
//! - [`error`] -- [`SimulationError`], the run-level error.
//!
//! [`SimulationComponent`]: component::SimulationComponent
//! [`WeatherFeed`]: weather_feed::WeatherFeed
//! [`SimulationError`]: error::SimulationError

pub mod bus;
pub mod component;
pub mod config;
pub mod daylength;
pub mod error;
pub mod management;
pub mod orchestrator;
pub mod params;
pub mod phenology;
pub mod registry;
pub mod rules;
pub mod thermal;
pub mod weather_alerts;
pub mod weather_feed;

pub use error::SimulationError;
pub use orchestrator::{Orchestrator, SimulationInputs};
