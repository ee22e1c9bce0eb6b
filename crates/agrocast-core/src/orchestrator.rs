//! The day-stepping loop.
//!
//! The [`Orchestrator`] owns everything a run needs: the weather feed, the
//! shared state registry, the signal bus, and the three components. Setup
//! happens in [`Orchestrator::new`]: rules are validated, the phenology
//! tracker is seeded on the start day, and the orchestrator's collector is
//! subscribed to every signal before the bus is sealed.
//!
//! Each following day runs two phases in a fixed component order:
//!
//! 1. **Rate** -- phenology, weather alerts, management alerts. Components
//!    see yesterday's committed registry state and today's weather only.
//! 2. **Integrate** -- same order. Registry values published by a component
//!    are visible to every later component on the same day, and raised
//!    signals reach the collector before the next component runs.
//!
//! A `Terminate` signal raised during integrate ends the run once every
//! component has integrated that day. Otherwise the run ends when the feed
//! has no more days.

use std::cell::RefCell;
use std::rc::Rc;

use agrocast_types::{
    AlertMessage, EndReason, PhenologyRecord, RunId, SimulationOutput, StageCode,
};
use chrono::{Days, NaiveDate};
use tracing::{debug, info, info_span, warn};

use crate::bus::{Signal, SignalBus, SignalId};
use crate::component::{IntegrateContext, RateContext, SimulationComponent};
use crate::error::SimulationError;
use crate::management::ManagementAlertEngine;
use crate::phenology::{PhenologyParameters, PhenologyTracker};
use crate::registry::SharedStateRegistry;
use crate::rules::{ManagementRule, WeatherAlertRule, WeatherAlertRuleRow};
use crate::weather_alerts::{TrustWindow, WeatherAlertEngine};
use crate::weather_feed::{WeatherFeed, validate_drivers};

/// Everything needed to set up a run besides the weather.
#[derive(Debug, Clone)]
pub struct SimulationInputs {
    /// Day the crop starts. Components are initialized on this day; the
    /// first stepped day is the one after.
    pub start_day: NaiveDate,
    /// Days per step.
    pub delt: u32,
    /// Crop development parameters.
    pub phenology: PhenologyParameters,
    /// Weather-alert rule rows.
    pub weather_rules: Vec<WeatherAlertRuleRow>,
    /// Management rule rows.
    pub management_rules: Vec<ManagementRule>,
    /// Forecast-trust window for weather alerts.
    pub trust: TrustWindow,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Days are still being stepped.
    Running,
    /// A terminate signal was handled; no further days run.
    Terminated,
}

/// What happened on one simulated day.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    /// The simulated day.
    pub day: NaiveDate,
    /// Stage at the end of the day.
    pub stage: StageCode,
    /// Development index at the end of the day.
    pub development_index: f64,
    /// Weather alerts raised today.
    pub weather_alerts: usize,
    /// Management alerts raised today.
    pub management_alerts: usize,
    /// Whether the run terminated at the end of this day.
    pub terminated: bool,
}

/// Called after every simulated day.
pub trait DayCallback {
    /// Called after a day's integrate phase completes.
    fn on_day(&mut self, summary: &DaySummary);
}

/// A callback that ignores every day.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl DayCallback for NoOpCallback {
    fn on_day(&mut self, _summary: &DaySummary) {}
}

/// Signals captured by the orchestrator's collector.
#[derive(Debug, Default)]
struct Collected {
    weather: Vec<AlertMessage>,
    management: Vec<AlertMessage>,
    /// Day of the crop-finish signal; decides the end reason.
    crop_finished: Option<NaiveDate>,
    terminate_requested: bool,
}

impl Collected {
    fn record(&mut self, signal: &Signal) {
        match signal {
            Signal::WeatherAlert { alert, .. } => self.weather.push(alert.clone()),
            Signal::ManagementAlert { alert, .. } => self.management.push(alert.clone()),
            Signal::CropFinish { day } => self.crop_finished = Some(*day),
            Signal::Terminate { .. } => self.terminate_requested = true,
        }
    }
}

/// Drives one simulation run.
#[derive(Debug)]
pub struct Orchestrator<F: WeatherFeed> {
    run_id: RunId,
    feed: F,
    delt: u32,
    start_day: NaiveDate,
    current_day: NaiveDate,
    days_simulated: u32,
    state: RunState,
    registry: SharedStateRegistry,
    bus: SignalBus,
    collected: Rc<RefCell<Collected>>,
    phenology: PhenologyTracker,
    weather: WeatherAlertEngine,
    management: ManagementAlertEngine,
}

impl<F: WeatherFeed> Orchestrator<F> {
    /// Validate inputs, initialize components on the start day, and wire
    /// the signal bus.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] for an invalid step, an invalid rule or
    /// crop parameter, or a feed that ends before the start day.
    pub fn new(run_id: RunId, feed: F, inputs: SimulationInputs) -> Result<Self, SimulationError> {
        let SimulationInputs {
            start_day,
            delt,
            phenology,
            weather_rules,
            management_rules,
            trust,
        } = inputs;

        if delt == 0 {
            return Err(SimulationError::InvalidStep { step: delt });
        }
        let last = feed
            .last_day()
            .ok_or(SimulationError::MissingWeather { day: start_day })?;
        if last < start_day {
            return Err(SimulationError::EmptyRange {
                start: start_day,
                last,
            });
        }

        let rules = weather_rules
            .iter()
            .map(WeatherAlertRule::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let tracker = PhenologyTracker::from_parameters(start_day, &phenology)?;

        let mut registry = SharedStateRegistry::new();
        tracker.publish_state(&mut registry, start_day)?;

        let collected: Rc<RefCell<Collected>> = Rc::default();
        let mut bus = SignalBus::new();
        let sink = Rc::clone(&collected);
        bus.subscribe(&SignalId::all(), move |signal: &Signal| {
            sink.borrow_mut().record(signal);
        })?;
        bus.seal();

        debug!(
            %run_id,
            start = %start_day,
            weather_rules = rules.len(),
            management_rules = management_rules.len(),
            "simulation initialized"
        );

        Ok(Self {
            run_id,
            feed,
            delt,
            start_day,
            current_day: start_day,
            days_simulated: 0,
            state: RunState::Running,
            registry,
            bus,
            collected,
            phenology: tracker,
            weather: WeatherAlertEngine::new(rules, trust),
            management: ManagementAlertEngine::new(management_rules),
        })
    }

    /// Identifier of this run.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Last day that has been fully stepped (the start day before any step).
    pub const fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    /// Read-only view of the shared registry.
    pub const fn registry(&self) -> &SharedStateRegistry {
        &self.registry
    }

    /// Phenology history so far.
    pub fn phenology_history(&self) -> &[PhenologyRecord] {
        self.phenology.history()
    }

    /// Step one day.
    ///
    /// Returns `None` without doing anything once the run has terminated or
    /// the feed has no further day.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if the day's weather is missing or
    /// invalid, or a component fails.
    pub fn step_day(&mut self) -> Result<Option<DaySummary>, SimulationError> {
        if self.state == RunState::Terminated {
            return Ok(None);
        }
        let day = self
            .current_day
            .checked_add_days(Days::new(u64::from(self.delt)))
            .ok_or(SimulationError::DateOverflow {
                day: self.current_day,
            })?;
        if self.feed.last_day().is_none_or(|last| day > last) {
            return Ok(None);
        }
        let drivers = self
            .feed
            .drivers(day)
            .ok_or(SimulationError::MissingWeather { day })?;
        validate_drivers(drivers)?;

        let (weather_before, management_before) = {
            let collected = self.collected.borrow();
            (collected.weather.len(), collected.management.len())
        };

        let mut components: [&mut dyn SimulationComponent; 3] =
            [&mut self.phenology, &mut self.weather, &mut self.management];

        let rate_ctx = RateContext {
            day,
            drivers,
            registry: &self.registry,
        };
        for component in &mut components {
            component.compute_rate(&rate_ctx)?;
        }

        let mut integrate_ctx = IntegrateContext {
            day,
            delt: self.delt,
            registry: &mut self.registry,
            bus: &mut self.bus,
        };
        for component in &mut components {
            component.integrate(&mut integrate_ctx)?;
        }

        self.current_day = day;
        self.days_simulated = self.days_simulated.saturating_add(1);

        let collected = self.collected.borrow();
        if collected.terminate_requested {
            self.state = RunState::Terminated;
        }
        let summary = DaySummary {
            day,
            stage: self.phenology.current_stage().clone(),
            development_index: self.phenology.development_index(),
            weather_alerts: collected.weather.len().saturating_sub(weather_before),
            management_alerts: collected.management.len().saturating_sub(management_before),
            terminated: self.state == RunState::Terminated,
        };
        drop(collected);

        debug!(
            day = %summary.day,
            stage = %summary.stage,
            dvs = summary.development_index,
            weather_alerts = summary.weather_alerts,
            management_alerts = summary.management_alerts,
            "day complete"
        );
        Ok(Some(summary))
    }

    /// Step days until the run terminates or the weather runs out, then
    /// finalize all components and return the output.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] from the first failing day.
    pub fn run(mut self, callback: &mut dyn DayCallback) -> Result<SimulationOutput, SimulationError> {
        let span = info_span!("simulation_run", run_id = %self.run_id);
        let _guard = span.enter();

        info!(
            start = %self.start_day,
            last = ?self.feed.last_day(),
            delt = self.delt,
            "Simulation starting"
        );

        while let Some(summary) = self.step_day()? {
            callback.on_day(&summary);
        }

        let last_day = self.current_day;
        self.phenology.finalize(last_day);
        self.weather.finalize(last_day);
        self.management.finalize(last_day);

        let collected = core::mem::take(&mut *self.collected.borrow_mut());
        let end_reason = if collected.crop_finished.is_some() {
            EndReason::CropMatured
        } else {
            if self.state == RunState::Terminated {
                warn!("run terminated without a crop-finish signal");
            }
            EndReason::WeatherExhausted
        };
        let output = SimulationOutput {
            run_id: self.run_id,
            phenology: self.phenology.history().to_vec(),
            weather_alerts: collected.weather,
            management_alerts: collected.management,
            maturity_date: self.phenology.maturity(),
            end_reason,
            days_simulated: self.days_simulated,
        };
        log_simulation_end(&output);
        Ok(output)
    }
}

/// Log a summary of a finished run.
pub fn log_simulation_end(output: &SimulationOutput) {
    info!(
        end_reason = ?output.end_reason,
        days = output.days_simulated,
        maturity = ?output.maturity_date,
        stages = output.phenology.len(),
        weather_alerts = output.weather_alerts.len(),
        management_alerts = output.management_alerts.len(),
        "Simulation ended"
    );
    if output.days_simulated == 0 {
        warn!("Simulation ended with no days simulated");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agrocast_types::{MessageId, WeatherDrivers};

    use super::*;
    use crate::daylength::PhotoperiodParams;
    use crate::phenology::StageThreshold;
    use crate::thermal::CardinalTemperatures;
    use crate::weather_feed::DailyWeatherSeries;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .checked_add_days(Days::new(n))
            .unwrap()
    }

    fn series(days: u64, temp: f64) -> DailyWeatherSeries {
        DailyWeatherSeries::from_records((0..days).map(|n| WeatherDrivers {
            day: day(n),
            temp,
            tmin: temp - 6.0,
            tmax: temp + 6.0,
            vap: 1.2,
            wind: 2.0,
            rain: 0.0,
            lat: 44.0,
        }))
        .unwrap()
    }

    fn inputs(stages: &[(&str, f64)]) -> SimulationInputs {
        SimulationInputs {
            start_day: day(0),
            delt: 1,
            phenology: PhenologyParameters {
                stages: stages
                    .iter()
                    .map(|(stage, tsum)| StageThreshold {
                        stage: StageCode::from(*stage),
                        tsum: *tsum,
                    })
                    .collect(),
                cardinal: CardinalTemperatures {
                    base: 0.0,
                    optimum_low: 25.0,
                    optimum_high: 35.0,
                    maximum: 45.0,
                },
                photoperiod: PhotoperiodParams::insensitive(),
            },
            weather_rules: Vec::new(),
            management_rules: Vec::new(),
            trust: TrustWindow::new(day(0), 3),
        }
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut bad = inputs(&[("A", 0.0), ("B", 10.0)]);
        bad.delt = 0;
        let result = Orchestrator::new(RunId::new(), series(3, 20.0), bad);
        assert!(matches!(result, Err(SimulationError::InvalidStep { .. })));
    }

    #[test]
    fn bad_rule_fails_before_any_day() {
        let mut bad = inputs(&[("A", 0.0), ("B", 10.0)]);
        bad.weather_rules.push(WeatherAlertRuleRow {
            signal: "SNOW_STRESS".to_owned(),
            parameters: "{}".to_owned(),
            message_id: MessageId(1),
            message: String::new(),
        });
        let result = Orchestrator::new(RunId::new(), series(3, 20.0), bad);
        assert!(matches!(result, Err(SimulationError::Rule { .. })));
    }

    #[test]
    fn start_day_is_published_before_stepping() {
        let orchestrator =
            Orchestrator::new(RunId::new(), series(3, 20.0), inputs(&[("A", 0.0), ("B", 1e6)]))
                .unwrap();
        assert_eq!(orchestrator.registry().current_stage().unwrap().as_str(), "A");
        assert_eq!(orchestrator.current_day(), day(0));
        assert_eq!(orchestrator.phenology_history().len(), 1);
    }

    #[test]
    fn run_stops_when_weather_runs_out() {
        let orchestrator =
            Orchestrator::new(RunId::new(), series(5, 20.0), inputs(&[("A", 0.0), ("B", 1e6)]))
                .unwrap();
        let output = orchestrator.run(&mut NoOpCallback).unwrap();
        assert_eq!(output.end_reason, EndReason::WeatherExhausted);
        assert_eq!(output.days_simulated, 4);
        assert_eq!(output.maturity_date, Some(day(4)));
    }

    #[test]
    fn run_stops_on_the_maturity_day() {
        let orchestrator = Orchestrator::new(
            RunId::new(),
            series(30, 30.0),
            inputs(&[("A", 0.0), ("B", 50.0), ("C", 100.0)]),
        )
        .unwrap();
        let output = orchestrator.run(&mut NoOpCallback).unwrap();
        assert_eq!(output.end_reason, EndReason::CropMatured);
        assert_eq!(output.maturity_date, Some(day(4)));
        assert_eq!(output.days_simulated, 4);
    }

    #[test]
    fn maturity_on_the_last_weather_day_counts_as_matured() {
        // Day 4 is both the last day of weather and the day B is reached.
        let orchestrator =
            Orchestrator::new(RunId::new(), series(5, 30.0), inputs(&[("A", 0.0), ("B", 100.0)]))
                .unwrap();
        let output = orchestrator.run(&mut NoOpCallback).unwrap();
        assert_eq!(output.end_reason, EndReason::CropMatured);
        assert_eq!(output.maturity_date, Some(day(4)));
        assert_eq!(output.days_simulated, 4);
    }

    #[test]
    fn terminated_run_does_not_step_again() {
        let mut orchestrator =
            Orchestrator::new(RunId::new(), series(10, 30.0), inputs(&[("A", 0.0), ("B", 25.0)]))
                .unwrap();
        let first = orchestrator.step_day().unwrap().unwrap();
        assert!(first.terminated);
        assert_eq!(orchestrator.state(), RunState::Terminated);
        assert!(orchestrator.step_day().unwrap().is_none());
    }

    #[test]
    fn missing_day_inside_the_range_is_an_error() {
        let mut records: Vec<WeatherDrivers> = Vec::new();
        for n in [0, 1, 3] {
            records.push(WeatherDrivers {
                day: day(n),
                temp: 20.0,
                tmin: 14.0,
                tmax: 26.0,
                vap: 1.2,
                wind: 2.0,
                rain: 0.0,
                lat: 44.0,
            });
        }
        let feed = DailyWeatherSeries::from_records(records).unwrap();
        let orchestrator =
            Orchestrator::new(RunId::new(), feed, inputs(&[("A", 0.0), ("B", 1e6)])).unwrap();
        let result = orchestrator.run(&mut NoOpCallback);
        assert!(matches!(
            result,
            Err(SimulationError::MissingWeather { day: d }) if d == day(2)
        ));
    }
}
