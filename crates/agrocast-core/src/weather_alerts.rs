//! Weather-stress alert machines.
//!
//! Every configured rule runs its own [`ThresholdMachine`]. The machines of
//! all five stress kinds share one state shape and differ only in their
//! [`BreachPredicate`](crate::rules::BreachPredicate):
//!
//! - rate phase: read the current stage and set the breach flag from
//!   today's weather;
//! - integrate phase: extend or reset the streak counter and, once the
//!   streak reaches the rule's duration, raise one alert dated at the first
//!   day of the streak.
//!
//! Alerts for days beyond the forecast-trust window are suppressed; the
//! streak is reset either way.

use std::collections::BTreeMap;

use agrocast_types::{AlertMessage, StageCode, WeatherDrivers, WeatherSignalKind};
use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::bus::Signal;
use crate::component::{IntegrateContext, RateContext, SimulationComponent};
use crate::error::SimulationError;
use crate::registry::ComponentId;
use crate::rules::WeatherAlertRule;

/// Default number of forecast days for which alerts are trusted.
pub const DEFAULT_TRUST_LIMIT_DAYS: i64 = 3;

/// How far past "today" alerts may be raised, per signal kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustWindow {
    today: NaiveDate,
    default_limit: i64,
    limits: BTreeMap<WeatherSignalKind, i64>,
}

impl TrustWindow {
    /// A window anchored at `today` with the same limit for every kind.
    pub const fn new(today: NaiveDate, default_limit: i64) -> Self {
        Self {
            today,
            default_limit,
            limits: BTreeMap::new(),
        }
    }

    /// Override the limit for one kind.
    #[must_use]
    pub fn with_limit(mut self, kind: WeatherSignalKind, limit: i64) -> Self {
        self.limits.insert(kind, limit);
        self
    }

    /// The reference day.
    pub const fn today(&self) -> NaiveDate {
        self.today
    }

    /// The limit in days that applies to `kind`.
    pub fn limit_for(&self, kind: WeatherSignalKind) -> i64 {
        self.limits.get(&kind).copied().unwrap_or(self.default_limit)
    }

    /// Whether an alert of `kind` computed on `day` may be raised.
    pub fn allows(&self, kind: WeatherSignalKind, day: NaiveDate) -> bool {
        day.signed_duration_since(self.today).num_days() <= self.limit_for(kind)
    }
}

/// Streak counter for one weather rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMachine {
    rule: WeatherAlertRule,
    flag: bool,
    counter: u32,
}

impl ThresholdMachine {
    /// A machine with no streak in progress.
    pub const fn new(rule: WeatherAlertRule) -> Self {
        Self {
            rule,
            flag: false,
            counter: 0,
        }
    }

    /// The rule this machine evaluates.
    pub const fn rule(&self) -> &WeatherAlertRule {
        &self.rule
    }

    /// Today's breach flag.
    pub const fn flag(&self) -> bool {
        self.flag
    }

    /// Consecutive breach days counted so far.
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Rate phase: recompute the breach flag.
    pub fn evaluate(&mut self, stage: &StageCode, day: NaiveDate, drivers: &WeatherDrivers) {
        self.flag = self.rule.predicate.is_breached(stage, day, drivers);
    }

    /// Integrate phase: update the streak and return the alert to raise,
    /// if any.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::DateOverflow`] if the onset date cannot
    /// be represented.
    pub fn advance(
        &mut self,
        day: NaiveDate,
        delt: u32,
        trust: &TrustWindow,
    ) -> Result<Option<AlertMessage>, SimulationError> {
        self.counter = if self.flag {
            self.counter.saturating_add(delt)
        } else {
            0
        };
        if self.counter < self.rule.duration {
            return Ok(None);
        }
        self.counter = 0;

        let kind = self.rule.kind;
        if !trust.allows(kind, day) {
            debug!(
                day = %day,
                kind = %kind,
                message_id = %self.rule.message_id,
                limit = trust.limit_for(kind),
                "alert beyond forecast-trust window suppressed"
            );
            return Ok(None);
        }

        let back = u64::from(self.rule.duration.saturating_sub(1));
        let onset = day
            .checked_sub_days(Days::new(back))
            .ok_or(SimulationError::DateOverflow { day })?;
        Ok(Some(AlertMessage {
            day: onset,
            message_id: self.rule.message_id,
            message: self.rule.message.clone(),
        }))
    }
}

/// All weather-alert machines of a run.
#[derive(Debug, Clone)]
pub struct WeatherAlertEngine {
    machines: Vec<ThresholdMachine>,
    trust: TrustWindow,
}

impl WeatherAlertEngine {
    /// Build one machine per rule, in rule order.
    pub fn new(rules: Vec<WeatherAlertRule>, trust: TrustWindow) -> Self {
        Self {
            machines: rules.into_iter().map(ThresholdMachine::new).collect(),
            trust,
        }
    }

    /// The machines, in rule order.
    pub fn machines(&self) -> &[ThresholdMachine] {
        &self.machines
    }

    /// The trust window in force.
    pub const fn trust(&self) -> &TrustWindow {
        &self.trust
    }
}

impl SimulationComponent for WeatherAlertEngine {
    fn component_id(&self) -> ComponentId {
        ComponentId::WeatherAlerts
    }

    fn compute_rate(&mut self, ctx: &RateContext<'_>) -> Result<(), SimulationError> {
        let stage = ctx.registry.current_stage()?;
        for machine in &mut self.machines {
            machine.evaluate(stage, ctx.day, ctx.drivers);
        }
        Ok(())
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), SimulationError> {
        for machine in &mut self.machines {
            if let Some(alert) = machine.advance(ctx.day, ctx.delt, &self.trust)? {
                let kind = machine.rule().kind;
                debug!(
                    day = %ctx.day,
                    kind = %kind,
                    reported = %alert.day,
                    message_id = %alert.message_id,
                    "weather alert"
                );
                ctx.raise(&Signal::WeatherAlert { kind, alert })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use agrocast_types::MessageId;

    use super::*;
    use crate::rules::WeatherAlertRuleRow;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .checked_add_days(Days::new(n))
            .unwrap()
    }

    fn tmax_rule() -> WeatherAlertRule {
        WeatherAlertRule::from_row(&WeatherAlertRuleRow {
            signal: "TMAX_STRESS".to_owned(),
            parameters: "{'TMAX_CRIT': [38.0], 'TMAX_STRESS_DURATION': 3, \
                         'TMAX_CRIT_BBCH': ['BBCH_21']}"
                .to_owned(),
            message_id: MessageId(11),
            message: "heat stress".to_owned(),
        })
        .unwrap()
    }

    fn hot(d: NaiveDate, tmax: f64) -> WeatherDrivers {
        WeatherDrivers {
            day: d,
            temp: tmax - 8.0,
            tmin: tmax - 15.0,
            tmax,
            vap: 1.0,
            wind: 2.0,
            rain: 0.0,
            lat: 40.0,
        }
    }

    fn run(
        machine: &mut ThresholdMachine,
        trust: &TrustWindow,
        start: u64,
        tmax: &[f64],
    ) -> Vec<(u64, AlertMessage)> {
        let stage = StageCode::from("BBCH_21");
        let mut fired = Vec::new();
        for (offset, t) in (start..).zip(tmax) {
            let d = day(offset);
            machine.evaluate(&stage, d, &hot(d, *t));
            if let Some(alert) = machine.advance(d, 1, trust).unwrap() {
                fired.push((offset, alert));
            }
        }
        fired
    }

    #[test]
    fn alert_is_dated_at_streak_onset() {
        let mut machine = ThresholdMachine::new(tmax_rule());
        let trust = TrustWindow::new(day(0), 3);
        let fired = run(&mut machine, &trust, 0, &[39.0, 39.0, 39.0, 30.0]);
        assert_eq!(fired.len(), 1);
        let (trigger, alert) = &fired[0];
        assert_eq!(*trigger, 2);
        assert_eq!(alert.day, day(0));
        assert_eq!(alert.message_id, MessageId(11));
        assert_eq!(machine.counter(), 0);
    }

    #[test]
    fn broken_streak_resets_counter() {
        let mut machine = ThresholdMachine::new(tmax_rule());
        let trust = TrustWindow::new(day(0), 3);
        let fired = run(&mut machine, &trust, 0, &[39.0, 39.0, 30.0, 39.0, 39.0]);
        assert!(fired.is_empty());
        assert_eq!(machine.counter(), 2);
    }

    #[test]
    fn long_streak_fires_once_per_duration() {
        let mut machine = ThresholdMachine::new(tmax_rule());
        let trust = TrustWindow::new(day(0), 10);
        let fired = run(&mut machine, &trust, 0, &[39.0; 6]);
        let days: Vec<u64> = fired.iter().map(|(trigger, _)| *trigger).collect();
        assert_eq!(days, vec![2, 5]);
        assert_eq!(fired[1].1.day, day(3));
    }

    #[test]
    fn alert_beyond_trust_window_is_suppressed_and_resets() {
        let mut machine = ThresholdMachine::new(tmax_rule());
        let trust = TrustWindow::new(day(0), 1);
        let fired = run(&mut machine, &trust, 3, &[39.0, 39.0, 39.0]);
        assert!(fired.is_empty());
        assert_eq!(machine.counter(), 0);
    }

    #[test]
    fn trust_boundary_is_inclusive() {
        let trust = TrustWindow::new(day(0), 3)
            .with_limit(WeatherSignalKind::FogStress, 1);
        assert!(trust.allows(WeatherSignalKind::TmaxStress, day(3)));
        assert!(!trust.allows(WeatherSignalKind::TmaxStress, day(4)));
        assert!(trust.allows(WeatherSignalKind::FogStress, day(1)));
        assert!(!trust.allows(WeatherSignalKind::FogStress, day(2)));
    }

    #[test]
    fn past_days_are_always_trusted() {
        let trust = TrustWindow::new(day(30), 0);
        assert!(trust.allows(WeatherSignalKind::RainStress, day(0)));
    }

    #[test]
    fn engine_keeps_rule_order() {
        let rule = tmax_rule();
        let predicate = rule.predicate.clone();
        let engine = WeatherAlertEngine::new(vec![rule], TrustWindow::new(day(0), 3));
        assert_eq!(engine.machines().len(), 1);
        assert_eq!(engine.machines()[0].rule().predicate, predicate);
    }
}
