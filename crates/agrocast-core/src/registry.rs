//! Per-run shared state registry.
//!
//! Components publish named values here during their own integrate call;
//! every other component reads them by key. The registry enforces the two
//! rules the day-step ordering depends on:
//!
//! - Each key has exactly one owning component. Only the owner may publish.
//! - A key is published at most once per simulation day.
//!
//! Together with the fixed component order, this guarantees that a value
//! published during a component's integrate call is what every later
//! component sees for the rest of that day.

use std::collections::BTreeMap;

use agrocast_types::StageCode;
use chrono::NaiveDate;

/// Errors raised by registry access.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    /// A key was published twice on the same day.
    #[error("{key} already published on {day}")]
    DuplicatePublish {
        /// The key that was republished.
        key: StateKey,
        /// The day of both publications.
        day: NaiveDate,
    },

    /// A component tried to publish a key owned by another component.
    #[error("{publisher} may not publish {key} (owned by {owner})")]
    ForeignPublish {
        /// The key being published.
        key: StateKey,
        /// The component that attempted the publish.
        publisher: ComponentId,
        /// The component that owns the key.
        owner: ComponentId,
    },

    /// A key was read before anything published it.
    #[error("{key} has not been published")]
    Missing {
        /// The key that was read.
        key: StateKey,
    },

    /// The value type did not match the key.
    #[error("{key} expects a {expected} value")]
    TypeMismatch {
        /// The key being published.
        key: StateKey,
        /// The value type the key carries.
        expected: &'static str,
    },
}

/// The components that take part in a day-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentId {
    /// The phenology stage tracker.
    Phenology,
    /// The weather-alert threshold machines.
    WeatherAlerts,
    /// The management-alert triggers.
    ManagementAlerts,
}

impl core::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Phenology => "phenology",
            Self::WeatherAlerts => "weather_alerts",
            Self::ManagementAlerts => "management_alerts",
        };
        f.write_str(name)
    }
}

/// Names of the values published on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    /// The growth stage the crop is currently in.
    CurrentStage,
    /// The cumulative development index.
    DevelopmentIndex,
}

impl StateKey {
    /// The component allowed to publish this key.
    pub const fn owner(self) -> ComponentId {
        match self {
            Self::CurrentStage | Self::DevelopmentIndex => ComponentId::Phenology,
        }
    }

    const fn value_type(self) -> &'static str {
        match self {
            Self::CurrentStage => "stage",
            Self::DevelopmentIndex => "number",
        }
    }
}

impl core::fmt::Display for StateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::CurrentStage => "BBCH_CURRENT_STAGE",
            Self::DevelopmentIndex => "DVS",
        };
        f.write_str(name)
    }
}

/// A value held on the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// A growth-stage code.
    Stage(StageCode),
    /// A real number.
    Number(f64),
}

impl StateValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage",
            Self::Number(_) => "number",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StateValue,
    published_on: NaiveDate,
}

/// Key/value board scoped to one simulation run.
#[derive(Debug, Clone, Default)]
pub struct SharedStateRegistry {
    entries: BTreeMap<StateKey, Entry>,
}

impl SharedStateRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Publish `value` under `key` for `day`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ForeignPublish`] if `publisher` does not own
    /// the key, [`RegistryError::TypeMismatch`] if the value has the wrong
    /// type, and [`RegistryError::DuplicatePublish`] if the key was already
    /// published on `day`.
    pub fn publish(
        &mut self,
        publisher: ComponentId,
        day: NaiveDate,
        key: StateKey,
        value: StateValue,
    ) -> Result<(), RegistryError> {
        let owner = key.owner();
        if publisher != owner {
            return Err(RegistryError::ForeignPublish {
                key,
                publisher,
                owner,
            });
        }
        if value.type_name() != key.value_type() {
            return Err(RegistryError::TypeMismatch {
                key,
                expected: key.value_type(),
            });
        }
        if let Some(existing) = self.entries.get(&key)
            && existing.published_on == day
        {
            return Err(RegistryError::DuplicatePublish { key, day });
        }
        self.entries.insert(
            key,
            Entry {
                value,
                published_on: day,
            },
        );
        Ok(())
    }

    /// Read the raw value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Missing`] if nothing was published yet.
    pub fn get(&self, key: StateKey) -> Result<&StateValue, RegistryError> {
        self.entries
            .get(&key)
            .map(|entry| &entry.value)
            .ok_or(RegistryError::Missing { key })
    }

    /// The day `key` was last published, if ever.
    pub fn published_on(&self, key: StateKey) -> Option<NaiveDate> {
        self.entries.get(&key).map(|entry| entry.published_on)
    }

    /// Read the current growth stage.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Missing`] before the tracker has initialized.
    pub fn current_stage(&self) -> Result<&StageCode, RegistryError> {
        match self.get(StateKey::CurrentStage)? {
            StateValue::Stage(stage) => Ok(stage),
            StateValue::Number(_) => Err(RegistryError::TypeMismatch {
                key: StateKey::CurrentStage,
                expected: StateKey::CurrentStage.value_type(),
            }),
        }
    }

    /// Read the cumulative development index.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Missing`] before the tracker has initialized.
    pub fn development_index(&self) -> Result<f64, RegistryError> {
        match self.get(StateKey::DevelopmentIndex)? {
            StateValue::Number(value) => Ok(*value),
            StateValue::Stage(_) => Err(RegistryError::TypeMismatch {
                key: StateKey::DevelopmentIndex,
                expected: StateKey::DevelopmentIndex.value_type(),
            }),
        }
    }
}
