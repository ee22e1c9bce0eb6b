//! Crop phenology: thermal-time accumulation through an ordered sequence of
//! growth stages.
//!
//! The tracker holds the stage the crop is in, the cumulative development
//! index (DVS), and the stages still ahead. Every day it adds
//! `thermal_response(temp) * photoperiod_factor * delt` to the index and
//! enters the next pending stage if the index has reached its threshold.
//! At most one stage is entered per day; a surplus carries over so a fast
//! day is followed by further transitions on the days after it. When the
//! last stage is entered the crop is mature and the run is asked to stop.
//!
//! The current stage and the index are published to the shared registry
//! once per day, so every stage in the sequence is visible to the
//! components that read the registry.

use std::collections::VecDeque;

use agrocast_types::{PhenologyRecord, StageCode};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::bus::Signal;
use crate::component::{IntegrateContext, RateContext, SimulationComponent};
use crate::daylength::{PhotoperiodParams, day_length};
use crate::error::SimulationError;
use crate::registry::{ComponentId, RegistryError, SharedStateRegistry, StateKey, StateValue};
use crate::thermal::{CardinalTemperatures, ThermalError, ThermalResponseFunction};

/// Errors raised while configuring phenology.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PhenologyError {
    /// The stage sequence has fewer than two entries.
    #[error("stage sequence needs at least two stages, got {count}")]
    TooFewStages {
        /// Number of stages supplied.
        count: usize,
    },

    /// A stage threshold is negative or not finite.
    #[error("stage {stage} has invalid threshold {threshold}")]
    InvalidThreshold {
        /// The offending stage.
        stage: StageCode,
        /// Its threshold.
        threshold: f64,
    },

    /// A stage threshold is below the one before it.
    #[error("stage {stage} threshold {threshold} is below the previous threshold {previous}")]
    DecreasingThreshold {
        /// The offending stage.
        stage: StageCode,
        /// Its threshold.
        threshold: f64,
        /// The preceding stage's threshold.
        previous: f64,
    },

    /// The photoperiod thresholds cannot define a linear response.
    #[error("photoperiod thresholds critical={critical} optimal={optimal} are invalid")]
    InvalidPhotoperiod {
        /// Critical day length.
        critical: f64,
        /// Optimal day length.
        optimal: f64,
    },

    /// The cardinal temperatures are invalid.
    #[error("thermal response error: {source}")]
    Thermal {
        /// The underlying thermal error.
        #[from]
        source: ThermalError,
    },
}

/// One entry of a stage sequence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageThreshold {
    /// Stage code.
    pub stage: StageCode,
    /// Cumulative thermal sum at which the stage is entered.
    pub tsum: f64,
}

/// Validated, ordered stage sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSequence {
    stages: Vec<StageThreshold>,
}

impl StageSequence {
    /// Validate an ordered list of stages.
    ///
    /// # Errors
    ///
    /// Returns [`PhenologyError`] if there are fewer than two stages or the
    /// thresholds are negative, not finite, or decreasing.
    pub fn new(stages: Vec<StageThreshold>) -> Result<Self, PhenologyError> {
        if stages.len() < 2 {
            return Err(PhenologyError::TooFewStages {
                count: stages.len(),
            });
        }
        let mut previous = 0.0_f64;
        for entry in &stages {
            if !entry.tsum.is_finite() || entry.tsum < 0.0 {
                return Err(PhenologyError::InvalidThreshold {
                    stage: entry.stage.clone(),
                    threshold: entry.tsum,
                });
            }
            if entry.tsum < previous {
                return Err(PhenologyError::DecreasingThreshold {
                    stage: entry.stage.clone(),
                    threshold: entry.tsum,
                    previous,
                });
            }
            previous = entry.tsum;
        }
        Ok(Self { stages })
    }

    /// The stages in order.
    pub fn stages(&self) -> &[StageThreshold] {
        &self.stages
    }

    /// Whether `stage` appears in the sequence.
    pub fn contains(&self, stage: &StageCode) -> bool {
        self.stages.iter().any(|entry| &entry.stage == stage)
    }
}

/// Crop parameters as supplied by the parameter store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhenologyParameters {
    /// Ordered growth stages with their thermal-sum thresholds.
    pub stages: Vec<StageThreshold>,
    /// Cardinal temperatures of the development response.
    pub cardinal: CardinalTemperatures,
    /// Photoperiod response; day-neutral when omitted.
    #[serde(default)]
    pub photoperiod: PhotoperiodParams,
}

/// Stage tracker for one run.
#[derive(Debug, Clone)]
pub struct PhenologyTracker {
    thermal: ThermalResponseFunction,
    photoperiod: PhotoperiodParams,
    current: StageCode,
    pending: VecDeque<StageThreshold>,
    development_index: f64,
    rate: f64,
    history: Vec<PhenologyRecord>,
    maturity: Option<NaiveDate>,
}

impl PhenologyTracker {
    /// Build a tracker from raw crop parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PhenologyError`] if any parameter is invalid.
    pub fn from_parameters(
        start_day: NaiveDate,
        params: &PhenologyParameters,
    ) -> Result<Self, PhenologyError> {
        let sequence = StageSequence::new(params.stages.clone())?;
        let thermal = ThermalResponseFunction::from_cardinal(&params.cardinal)?;
        Self::initialize(start_day, sequence, thermal, params.photoperiod)
    }

    /// Seed the tracker on `start_day`.
    ///
    /// The first stage becomes current, the second stage's threshold is the
    /// first target, and the history starts with `(start_day, first, 0.0)`.
    ///
    /// # Errors
    ///
    /// Returns [`PhenologyError::InvalidPhotoperiod`] for unusable
    /// photoperiod thresholds.
    pub fn initialize(
        start_day: NaiveDate,
        sequence: StageSequence,
        thermal: ThermalResponseFunction,
        photoperiod: PhotoperiodParams,
    ) -> Result<Self, PhenologyError> {
        photoperiod.validate()?;
        let mut pending: VecDeque<StageThreshold> = sequence.stages.into();
        let Some(first) = pending.pop_front() else {
            return Err(PhenologyError::TooFewStages { count: 0 });
        };
        let history = vec![PhenologyRecord {
            day: start_day,
            stage: first.stage.clone(),
            development_index: 0.0,
        }];
        debug!(
            day = %start_day,
            stage = %first.stage,
            remaining = pending.len(),
            "phenology initialized"
        );
        Ok(Self {
            thermal,
            photoperiod,
            current: first.stage,
            pending,
            development_index: 0.0,
            rate: 0.0,
            history,
            maturity: None,
        })
    }

    /// Publish the current stage and development index for `day`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if either key was already published today.
    pub fn publish_state(
        &self,
        registry: &mut SharedStateRegistry,
        day: NaiveDate,
    ) -> Result<(), RegistryError> {
        registry.publish(
            ComponentId::Phenology,
            day,
            StateKey::CurrentStage,
            StateValue::Stage(self.current.clone()),
        )?;
        registry.publish(
            ComponentId::Phenology,
            day,
            StateKey::DevelopmentIndex,
            StateValue::Number(self.development_index),
        )
    }

    /// The stage the crop is currently in.
    pub const fn current_stage(&self) -> &StageCode {
        &self.current
    }

    /// Cumulative development index.
    pub const fn development_index(&self) -> f64 {
        self.development_index
    }

    /// Threshold of the next stage, or `None` once the last stage is reached.
    pub fn target(&self) -> Option<f64> {
        self.pending.front().map(|next| next.tsum)
    }

    /// Rate computed in the most recent rate phase.
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Stage transitions recorded so far, oldest first.
    pub fn history(&self) -> &[PhenologyRecord] {
        &self.history
    }

    /// Day the crop matured, if known.
    pub const fn maturity(&self) -> Option<NaiveDate> {
        self.maturity
    }

    /// Whether every stage has been entered.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// Enter the next pending stage if its threshold has been reached.
    ///
    /// Returns `true` when this call entered the final stage.
    fn advance_stage(&mut self, day: NaiveDate) -> bool {
        let reached = self
            .pending
            .front()
            .is_some_and(|next| self.development_index >= next.tsum);
        if !reached {
            return false;
        }
        let Some(next) = self.pending.pop_front() else {
            return false;
        };
        info!(
            day = %day,
            stage = %next.stage,
            dvs = self.development_index,
            "stage reached"
        );
        self.history.push(PhenologyRecord {
            day,
            stage: next.stage.clone(),
            development_index: round_one_decimal(self.development_index),
        });
        self.current = next.stage;
        self.pending.is_empty()
    }
}

impl SimulationComponent for PhenologyTracker {
    fn component_id(&self) -> ComponentId {
        ComponentId::Phenology
    }

    fn compute_rate(&mut self, ctx: &RateContext<'_>) -> Result<(), SimulationError> {
        let drivers = ctx.drivers;
        let thermal_rate = self.thermal.evaluate(drivers.temp);
        let factor = if self.photoperiod.is_sensitive() {
            self.photoperiod
                .reduction_factor(day_length(drivers.lat, ctx.day))
        } else {
            1.0
        };
        self.rate = thermal_rate * factor;
        Ok(())
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), SimulationError> {
        self.development_index = self
            .rate
            .mul_add(f64::from(ctx.delt), self.development_index);
        let entered_last = self.advance_stage(ctx.day);
        self.publish_state(ctx.registry, ctx.day)?;

        if entered_last {
            self.maturity = Some(ctx.day);
            info!(day = %ctx.day, stage = %self.current, "crop matured");
            ctx.raise(&Signal::CropFinish { day: ctx.day })?;
            ctx.raise(&Signal::Terminate { day: ctx.day })?;
        }
        Ok(())
    }

    fn finalize(&mut self, day: NaiveDate) {
        if self.maturity.is_none() {
            self.maturity = Some(day);
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use agrocast_types::WeatherDrivers;

    use super::*;
    use crate::bus::{SignalBus, SignalId};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn stage(code: &str, tsum: f64) -> StageThreshold {
        StageThreshold {
            stage: StageCode::from(code),
            tsum,
        }
    }

    /// Plateau height 25: a mean temperature of 30 °C yields rate 25.
    fn plateau_25() -> ThermalResponseFunction {
        ThermalResponseFunction::from_cardinal(&CardinalTemperatures {
            base: 0.0,
            optimum_low: 25.0,
            optimum_high: 35.0,
            maximum: 45.0,
        })
        .unwrap()
    }

    fn drivers(d: NaiveDate, temp: f64) -> WeatherDrivers {
        WeatherDrivers {
            day: d,
            temp,
            tmin: temp - 5.0,
            tmax: temp + 5.0,
            vap: 1.5,
            wind: 2.0,
            rain: 0.0,
            lat: 45.0,
        }
    }

    fn open_bus() -> SignalBus {
        let mut bus = SignalBus::new();
        bus.subscribe(&SignalId::all(), |_: &Signal| {}).unwrap();
        bus.seal();
        bus
    }

    fn step(
        tracker: &mut PhenologyTracker,
        registry: &mut SharedStateRegistry,
        bus: &mut SignalBus,
        d: NaiveDate,
        temp: f64,
    ) {
        let weather = drivers(d, temp);
        tracker
            .compute_rate(&RateContext {
                day: d,
                drivers: &weather,
                registry,
            })
            .unwrap();
        tracker
            .integrate(&mut IntegrateContext {
                day: d,
                delt: 1,
                registry,
                bus,
            })
            .unwrap();
    }

    #[test]
    fn sequence_needs_two_stages() {
        assert_eq!(
            StageSequence::new(vec![stage("BBCH_01", 0.0)]),
            Err(PhenologyError::TooFewStages { count: 1 })
        );
        assert!(StageSequence::new(Vec::new()).is_err());
    }

    #[test]
    fn sequence_rejects_decreasing_thresholds() {
        let result = StageSequence::new(vec![
            stage("BBCH_01", 0.0),
            stage("BBCH_10", 100.0),
            stage("BBCH_12", 50.0),
        ]);
        assert!(matches!(
            result,
            Err(PhenologyError::DecreasingThreshold { .. })
        ));
    }

    #[test]
    fn initialization_records_first_stage() {
        let sequence =
            StageSequence::new(vec![stage("BBCH_01", 0.0), stage("BBCH_10", 100.0)]).unwrap();
        let tracker = PhenologyTracker::initialize(
            day(1),
            sequence,
            plateau_25(),
            PhotoperiodParams::insensitive(),
        )
        .unwrap();
        assert_eq!(tracker.current_stage().as_str(), "BBCH_01");
        assert_eq!(tracker.target(), Some(100.0));
        assert_eq!(tracker.history().len(), 1);
        assert_eq!(tracker.history()[0].day, day(1));
    }

    #[test]
    fn reaches_stage_on_first_day_at_threshold() {
        let sequence =
            StageSequence::new(vec![stage("BBCH_01", 0.0), stage("BBCH_10", 100.0)]).unwrap();
        let mut tracker = PhenologyTracker::initialize(
            day(1),
            sequence,
            plateau_25(),
            PhotoperiodParams::insensitive(),
        )
        .unwrap();
        let mut registry = SharedStateRegistry::new();
        tracker.publish_state(&mut registry, day(1)).unwrap();
        let mut bus = open_bus();

        for d in 2..=5 {
            step(&mut tracker, &mut registry, &mut bus, day(d), 30.0);
        }

        let last = tracker.history().last().unwrap();
        assert_eq!(last.stage.as_str(), "BBCH_10");
        assert_eq!(last.day, day(5));
        assert!((last.development_index - 100.0).abs() < 1e-9);
        assert_eq!(tracker.maturity(), Some(day(5)));
        assert_eq!(registry.current_stage().unwrap().as_str(), "BBCH_10");
    }

    #[test]
    fn one_stage_per_day_with_surplus_carried_over() {
        let sequence = StageSequence::new(vec![
            stage("BBCH_01", 0.0),
            stage("BBCH_09", 10.0),
            stage("BBCH_10", 20.0),
            stage("BBCH_12", 500.0),
        ])
        .unwrap();
        let mut tracker = PhenologyTracker::initialize(
            day(1),
            sequence,
            plateau_25(),
            PhotoperiodParams::insensitive(),
        )
        .unwrap();
        let mut registry = SharedStateRegistry::new();
        let mut bus = open_bus();

        step(&mut tracker, &mut registry, &mut bus, day(2), 30.0);
        assert_eq!(tracker.current_stage().as_str(), "BBCH_09");
        assert_eq!(registry.current_stage().unwrap().as_str(), "BBCH_09");

        // No development at all, but BBCH_10 is already due.
        step(&mut tracker, &mut registry, &mut bus, day(3), -3.0);
        assert_eq!(tracker.current_stage().as_str(), "BBCH_10");
        assert_eq!(registry.current_stage().unwrap().as_str(), "BBCH_10");

        let entered: Vec<(&str, NaiveDate)> = tracker
            .history()
            .iter()
            .map(|record| (record.stage.as_str(), record.day))
            .collect();
        assert_eq!(
            entered,
            vec![
                ("BBCH_01", day(1)),
                ("BBCH_09", day(2)),
                ("BBCH_10", day(3))
            ]
        );
        assert!((tracker.history()[2].development_index - 25.0).abs() < 1e-9);
        assert_eq!(tracker.target(), Some(500.0));
        assert_eq!(tracker.maturity(), None);
    }

    #[test]
    fn cold_days_do_not_develop() {
        let sequence =
            StageSequence::new(vec![stage("BBCH_01", 0.0), stage("BBCH_10", 100.0)]).unwrap();
        let mut tracker = PhenologyTracker::initialize(
            day(1),
            sequence,
            plateau_25(),
            PhotoperiodParams::insensitive(),
        )
        .unwrap();
        let mut registry = SharedStateRegistry::new();
        let mut bus = open_bus();
        step(&mut tracker, &mut registry, &mut bus, day(2), -3.0);
        assert!(tracker.development_index().abs() < f64::EPSILON);
        assert!(registry.development_index().unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn finalize_sets_maturity_once() {
        let sequence =
            StageSequence::new(vec![stage("BBCH_01", 0.0), stage("BBCH_10", 100.0)]).unwrap();
        let mut tracker = PhenologyTracker::initialize(
            day(1),
            sequence,
            plateau_25(),
            PhotoperiodParams::insensitive(),
        )
        .unwrap();
        tracker.finalize(day(9));
        tracker.finalize(day(12));
        assert_eq!(tracker.maturity(), Some(day(9)));
    }
}
