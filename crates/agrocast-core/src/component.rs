//! Phase contexts and the component contract.
//!
//! Every simulation day runs two phases across all components in a fixed
//! order. Each phase hands components a context carrying exactly the access
//! that phase allows:
//!
//! - [`RateContext`] -- read-only registry plus today's weather. Nothing can
//!   be published or raised, so a rate computed here depends only on
//!   yesterday's committed state and today's drivers.
//! - [`IntegrateContext`] -- mutable registry and the signal bus. Values
//!   published here are visible to every later component the same day.

use agrocast_types::WeatherDrivers;
use chrono::NaiveDate;

use crate::bus::{Signal, SignalBus};
use crate::error::SimulationError;
use crate::registry::{ComponentId, SharedStateRegistry, StateKey, StateValue};

/// Access granted during the rate phase.
#[derive(Debug, Clone, Copy)]
pub struct RateContext<'a> {
    /// The day being simulated.
    pub day: NaiveDate,
    /// Today's weather drivers.
    pub drivers: &'a WeatherDrivers,
    /// State committed by previous integrate phases.
    pub registry: &'a SharedStateRegistry,
}

/// Access granted during the integrate phase.
#[derive(Debug)]
pub struct IntegrateContext<'a> {
    /// The day being simulated.
    pub day: NaiveDate,
    /// Time step in days.
    pub delt: u32,
    /// The run's shared state.
    pub registry: &'a mut SharedStateRegistry,
    /// The run's signal bus.
    pub bus: &'a mut SignalBus,
}

impl IntegrateContext<'_> {
    /// Publish a registry value on behalf of `publisher` for today.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::registry::RegistryError`] as a
    /// [`SimulationError`].
    pub fn publish(
        &mut self,
        publisher: ComponentId,
        key: StateKey,
        value: StateValue,
    ) -> Result<(), SimulationError> {
        self.registry.publish(publisher, self.day, key, value)?;
        Ok(())
    }

    /// Raise a signal; handlers have run by the time this returns.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::bus::BusError`] as a [`SimulationError`].
    pub fn raise(&mut self, signal: &Signal) -> Result<(), SimulationError> {
        self.bus.publish(signal)?;
        Ok(())
    }
}

/// A participant in the daily two-phase step.
pub trait SimulationComponent {
    /// Which component this is (used for registry ownership and logs).
    fn component_id(&self) -> ComponentId;

    /// Compute today's rates from committed state and today's drivers.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the drivers cannot be used.
    fn compute_rate(&mut self, ctx: &RateContext<'_>) -> Result<(), SimulationError>;

    /// Commit today's rates to state, publishing values and raising signals.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] on registry or bus failures.
    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), SimulationError>;

    /// Final bookkeeping once the run has stopped. `day` is the last
    /// simulated day.
    fn finalize(&mut self, _day: NaiveDate) {}
}
