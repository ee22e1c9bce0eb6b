//! Shared type definitions for the Agrocast simulation.
//!
//! This crate holds the records exchanged between the simulation core and
//! its collaborators: the daily weather input, the alert and phenology
//! output, and the identifiers that tie them together. Output types flow to
//! `TypeScript` via `ts-rs` for the alert dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Run, stage-code and message identifiers
//! - [`enums`] -- Weather signal kinds and run end reasons
//! - [`structs`] -- Weather drivers, alert messages, phenology records

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EndReason, WeatherSignalKind};
pub use ids::{MessageId, RunId, StageCode};
pub use structs::{AlertMessage, PhenologyRecord, SimulationOutput, WeatherDrivers};
