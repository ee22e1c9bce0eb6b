//! Alert rule definitions.
//!
//! Weather rules arrive as table rows: a signal-kind name, a parameter
//! literal (see [`crate::params`]), a message id, and a message text. Each
//! row is turned into a [`WeatherAlertRule`] whose [`BreachPredicate`]
//! carries the per-stage thresholds of its kind. Management rules need no
//! parsing and deserialize directly into [`ManagementRule`].
//!
//! Every row is validated before the first simulated day. An unknown signal
//! kind, an unknown or missing parameter, or mismatched stage/threshold
//! lists fail setup.

use std::collections::{BTreeMap, BTreeSet};

use agrocast_types::{MessageId, StageCode, WeatherDrivers, WeatherSignalKind};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::params::{ParameterError, ParameterSet};

/// Errors raised while building alert rules.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    /// The row names a signal kind the engine does not know.
    #[error("unknown signal kind {name:?}")]
    UnknownSignalKind {
        /// The unrecognized name.
        name: String,
    },

    /// The parameter literal could not be parsed or read.
    #[error("message {message_id}: {source}")]
    Parameters {
        /// The rule row's message id.
        message_id: MessageId,
        /// The underlying parameter error.
        source: ParameterError,
    },

    /// The parameter literal contains a key the rule kind does not use.
    #[error("{kind} rule does not accept parameter {field}")]
    UnknownField {
        /// The rule kind.
        kind: WeatherSignalKind,
        /// The unexpected key.
        field: String,
    },

    /// A threshold list does not line up with the stage list.
    #[error("{kind} rule: {field} has {found} values for {expected} stages")]
    LengthMismatch {
        /// The rule kind.
        kind: WeatherSignalKind,
        /// The threshold list.
        field: &'static str,
        /// Number of stages.
        expected: usize,
        /// Number of thresholds.
        found: usize,
    },

    /// The rule applies to no stage.
    #[error("{kind} rule lists no stages")]
    NoStages {
        /// The rule kind.
        kind: WeatherSignalKind,
    },

    /// The breach duration is not a positive number of days.
    #[error("{kind} rule duration {duration} must be at least one day")]
    InvalidDuration {
        /// The rule kind.
        kind: WeatherSignalKind,
        /// The rejected duration.
        duration: i64,
    },

    /// A fog month is outside 1..=12.
    #[error("fog month {month} is not between 1 and 12")]
    InvalidMonth {
        /// The rejected month.
        month: i64,
    },

    /// The fog day-of-year window is malformed.
    #[error("fog day-of-year window {window:?} must be [start, end] within 1..=366")]
    InvalidDayOfYearWindow {
        /// The rejected window.
        window: Vec<i64>,
    },

    /// The rainfall unit is not recognized.
    #[error("unknown rain unit {unit:?}")]
    InvalidRainUnit {
        /// The rejected unit.
        unit: String,
    },
}

/// One row of the weather-alert rule table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeatherAlertRuleRow {
    /// Signal-kind name, e.g. `TMAX_STRESS`.
    pub signal: String,
    /// Parameter dictionary literal.
    pub parameters: String,
    /// Message identifier.
    pub message_id: MessageId,
    /// Message text.
    pub message: String,
}

/// One row of the management rule table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagementRule {
    /// Stage whose arrival triggers the message.
    pub stage: StageCode,
    /// Days between the trigger day and the reported day; may be negative.
    pub offset_days: i32,
    /// Message identifier.
    pub message_id: MessageId,
    /// Message text.
    pub message: String,
}

/// Unit the rainfall thresholds of a rule are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RainUnit {
    /// Millimetres per day.
    #[default]
    Millimetres,
    /// Centimetres per day.
    Centimetres,
}

impl RainUnit {
    /// Convert a rainfall amount in cm/day into this unit.
    pub fn from_cm(self, rain_cm: f64) -> f64 {
        match self {
            Self::Millimetres => rain_cm * 10.0,
            Self::Centimetres => rain_cm,
        }
    }
}

/// Inclusive day-of-year range. Wraps past new year when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOfYearWindow {
    /// First day of the window.
    pub start: u32,
    /// Last day of the window.
    pub end: u32,
}

impl DayOfYearWindow {
    /// Fog window used when a rule names none: day 337 through day 59.
    pub const WINTER: Self = Self { start: 337, end: 59 };

    /// Whether `ordinal` falls in the window.
    pub const fn contains(&self, ordinal: u32) -> bool {
        if self.start <= self.end {
            ordinal >= self.start && ordinal <= self.end
        } else {
            ordinal >= self.start || ordinal <= self.end
        }
    }
}

/// Calendar limits of a fog rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogSeason {
    /// Months (1-12) in which fog is relevant.
    pub months: BTreeSet<u32>,
    /// Day-of-year restriction on top of the months.
    pub day_of_year: DayOfYearWindow,
}

impl FogSeason {
    /// Whether `day` is inside the fog season.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.months.contains(&day.month()) && self.day_of_year.contains(day.ordinal())
    }
}

/// Per-stage fog thresholds, all of which must be met.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogThresholds {
    /// Minimum relative humidity (%).
    pub relative_humidity: f64,
    /// Maximum wind speed (m/s).
    pub wind: f64,
    /// Maximum minimum temperature (°C).
    pub tmin: f64,
}

/// The condition a weather rule tests each day.
#[derive(Debug, Clone, PartialEq)]
pub enum BreachPredicate {
    /// Tmax at or above the stage threshold.
    MaxTemperature {
        /// Threshold per stage (°C).
        thresholds: BTreeMap<StageCode, f64>,
    },
    /// Tmin at or below the stage threshold.
    MinTemperature {
        /// Threshold per stage (°C).
        thresholds: BTreeMap<StageCode, f64>,
    },
    /// Rainfall at or above the stage threshold.
    Rainfall {
        /// Threshold per stage, in `unit`.
        thresholds: BTreeMap<StageCode, f64>,
        /// Unit of the thresholds.
        unit: RainUnit,
    },
    /// Mean relative humidity at or above the stage threshold.
    RelativeHumidity {
        /// Threshold per stage (%).
        thresholds: BTreeMap<StageCode, f64>,
    },
    /// Humid, calm, cold days inside the fog season.
    Fog {
        /// Thresholds per stage.
        thresholds: BTreeMap<StageCode, FogThresholds>,
        /// Months and days in which fog is relevant.
        season: FogSeason,
    },
}

impl BreachPredicate {
    /// Whether today's weather breaches the rule for the given stage.
    ///
    /// A stage the rule does not list never breaches.
    pub fn is_breached(&self, stage: &StageCode, day: NaiveDate, drivers: &WeatherDrivers) -> bool {
        match self {
            Self::MaxTemperature { thresholds } => thresholds
                .get(stage)
                .is_some_and(|limit| drivers.tmax >= *limit),
            Self::MinTemperature { thresholds } => thresholds
                .get(stage)
                .is_some_and(|limit| drivers.tmin <= *limit),
            Self::Rainfall { thresholds, unit } => thresholds
                .get(stage)
                .is_some_and(|limit| unit.from_cm(drivers.rain) >= *limit),
            Self::RelativeHumidity { thresholds } => thresholds
                .get(stage)
                .is_some_and(|limit| relative_humidity(drivers) >= *limit),
            Self::Fog { thresholds, season } => {
                let Some(limits) = thresholds.get(stage) else {
                    return false;
                };
                season.contains(day)
                    && relative_humidity(drivers) >= limits.relative_humidity
                    && drivers.wind <= limits.wind
                    && drivers.tmin <= limits.tmin
            }
        }
    }
}

/// Saturated vapour pressure (kPa) at `temp` (°C).
pub fn saturated_vapour_pressure(temp: f64) -> f64 {
    0.6108 * ((17.27 * temp) / (237.3 + temp)).exp()
}

/// Daily mean relative humidity (%) from vapour pressure and the saturated
/// vapour pressure averaged over Tmax and Tmin. Capped at 100.
pub fn relative_humidity(drivers: &WeatherDrivers) -> f64 {
    let svap =
        (saturated_vapour_pressure(drivers.tmax) + saturated_vapour_pressure(drivers.tmin)) / 2.0;
    100.0 * drivers.vap.min(svap) / svap
}

/// A fully validated weather-alert rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAlertRule {
    /// Which stress the rule detects.
    pub kind: WeatherSignalKind,
    /// Daily breach condition.
    pub predicate: BreachPredicate,
    /// Consecutive breach days needed to alert.
    pub duration: u32,
    /// Message identifier.
    pub message_id: MessageId,
    /// Message text.
    pub message: String,
}

/// Parameter names used by one rule kind.
struct KindFields {
    threshold: &'static str,
    duration: &'static str,
    stages: &'static str,
    extra: &'static [&'static str],
}

const fn fields_of(kind: WeatherSignalKind) -> KindFields {
    match kind {
        WeatherSignalKind::TmaxStress => KindFields {
            threshold: "TMAX_CRIT",
            duration: "TMAX_STRESS_DURATION",
            stages: "TMAX_CRIT_BBCH",
            extra: &[],
        },
        WeatherSignalKind::TminStress => KindFields {
            threshold: "TMIN_CRIT",
            duration: "TMIN_STRESS_DURATION",
            stages: "TMIN_CRIT_BBCH",
            extra: &[],
        },
        WeatherSignalKind::RainStress => KindFields {
            threshold: "RAIN_CRIT",
            duration: "RAIN_DURATION",
            stages: "RAIN_CRIT_BBCH",
            extra: &["RAIN_UNIT"],
        },
        WeatherSignalKind::RhmaxStress => KindFields {
            threshold: "RHMAX_CRIT",
            duration: "RHMAX_STRESS_DURATION",
            stages: "RHMAX_CRIT_BBCH",
            extra: &[],
        },
        WeatherSignalKind::FogStress => KindFields {
            threshold: "RHMAX_CRIT",
            duration: "FOG_DURATION",
            stages: "CRIT_BBCH",
            extra: &["UMIN_CRIT", "TMIN_CRIT", "FOG_RELEVANT_MONTHS", "FOG_RELEVANT_DOY"],
        },
    }
}

impl WeatherAlertRule {
    /// Build a rule from a table row.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] for an unknown signal kind or any invalid
    /// parameter.
    pub fn from_row(row: &WeatherAlertRuleRow) -> Result<Self, RuleError> {
        let kind =
            WeatherSignalKind::from_name(row.signal.trim()).ok_or_else(|| {
                RuleError::UnknownSignalKind {
                    name: row.signal.clone(),
                }
            })?;
        let params = ParameterSet::parse(&row.parameters).map_err(|source| {
            RuleError::Parameters {
                message_id: row.message_id,
                source,
            }
        })?;
        Self::from_parameters(kind, &params, row.message_id, row.message.clone())
    }

    /// Build a rule of `kind` from parsed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] for unknown, missing, or inconsistent
    /// parameters.
    pub fn from_parameters(
        kind: WeatherSignalKind,
        params: &ParameterSet,
        message_id: MessageId,
        message: String,
    ) -> Result<Self, RuleError> {
        let fields = fields_of(kind);
        for key in params.keys() {
            let known = key == fields.threshold
                || key == fields.duration
                || key == fields.stages
                || fields.extra.contains(&key);
            if !known {
                return Err(RuleError::UnknownField {
                    kind,
                    field: key.to_owned(),
                });
            }
        }

        let read = |source: ParameterError| RuleError::Parameters { message_id, source };

        let raw_duration = params.integer(fields.duration).map_err(read)?;
        let duration = u32::try_from(raw_duration)
            .ok()
            .filter(|days| *days >= 1)
            .ok_or(RuleError::InvalidDuration {
                kind,
                duration: raw_duration,
            })?;

        let stages: Vec<StageCode> = params
            .texts(fields.stages)
            .map_err(read)?
            .into_iter()
            .map(StageCode::from)
            .collect();
        if stages.is_empty() {
            return Err(RuleError::NoStages { kind });
        }

        let per_stage = |field: &'static str| -> Result<Vec<f64>, RuleError> {
            let values = params.numbers(field).map_err(read)?;
            if values.len() == stages.len() {
                Ok(values)
            } else {
                Err(RuleError::LengthMismatch {
                    kind,
                    field,
                    expected: stages.len(),
                    found: values.len(),
                })
            }
        };

        let predicate = match kind {
            WeatherSignalKind::TmaxStress => BreachPredicate::MaxTemperature {
                thresholds: by_stage(&stages, per_stage(fields.threshold)?),
            },
            WeatherSignalKind::TminStress => BreachPredicate::MinTemperature {
                thresholds: by_stage(&stages, per_stage(fields.threshold)?),
            },
            WeatherSignalKind::RhmaxStress => BreachPredicate::RelativeHumidity {
                thresholds: by_stage(&stages, per_stage(fields.threshold)?),
            },
            WeatherSignalKind::RainStress => {
                let unit = if params.contains("RAIN_UNIT") {
                    parse_rain_unit(params.text("RAIN_UNIT").map_err(read)?)?
                } else {
                    RainUnit::default()
                };
                BreachPredicate::Rainfall {
                    thresholds: by_stage(&stages, per_stage(fields.threshold)?),
                    unit,
                }
            }
            WeatherSignalKind::FogStress => {
                let humidity = per_stage("RHMAX_CRIT")?;
                let wind = per_stage("UMIN_CRIT")?;
                let tmin = per_stage("TMIN_CRIT")?;
                let limits = humidity
                    .into_iter()
                    .zip(wind)
                    .zip(tmin)
                    .map(|((relative_humidity, wind), tmin)| FogThresholds {
                        relative_humidity,
                        wind,
                        tmin,
                    })
                    .collect();
                let months = params
                    .integers("FOG_RELEVANT_MONTHS")
                    .map_err(read)?
                    .into_iter()
                    .map(|month| {
                        u32::try_from(month)
                            .ok()
                            .filter(|m| (1..=12).contains(m))
                            .ok_or(RuleError::InvalidMonth { month })
                    })
                    .collect::<Result<BTreeSet<u32>, RuleError>>()?;
                let day_of_year = if params.contains("FOG_RELEVANT_DOY") {
                    parse_doy_window(params.integers("FOG_RELEVANT_DOY").map_err(read)?)?
                } else {
                    DayOfYearWindow::WINTER
                };
                BreachPredicate::Fog {
                    thresholds: by_stage(&stages, limits),
                    season: FogSeason {
                        months,
                        day_of_year,
                    },
                }
            }
        };

        Ok(Self {
            kind,
            predicate,
            duration,
            message_id,
            message,
        })
    }
}

/// Pair stages with their thresholds. A repeated stage keeps its first
/// threshold.
fn by_stage<T>(stages: &[StageCode], values: Vec<T>) -> BTreeMap<StageCode, T> {
    let mut map = BTreeMap::new();
    for (stage, value) in stages.iter().zip(values) {
        map.entry(stage.clone()).or_insert(value);
    }
    map
}

fn parse_rain_unit(unit: &str) -> Result<RainUnit, RuleError> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "mm" => Ok(RainUnit::Millimetres),
        "cm" => Ok(RainUnit::Centimetres),
        _ => Err(RuleError::InvalidRainUnit {
            unit: unit.to_owned(),
        }),
    }
}

fn parse_doy_window(values: Vec<i64>) -> Result<DayOfYearWindow, RuleError> {
    let as_day = |value: i64| u32::try_from(value).ok().filter(|d| (1..=366).contains(d));
    if let [start, end] = values.as_slice()
        && let (Some(start), Some(end)) = (as_day(*start), as_day(*end))
    {
        return Ok(DayOfYearWindow { start, end });
    }
    Err(RuleError::InvalidDayOfYearWindow { window: values })
}
