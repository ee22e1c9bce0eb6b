//! Scenario files: everything one run needs, in the data provider's units.
//!
//! A scenario is a JSON document holding the crop identity, the start day,
//! crop parameters, a daily weather series and the full alert rule tables.
//! Weather arrives as the provider stores it (vapour pressure in hPa, rain
//! in mm/day, wind at 10 m) and is converted to the core's units here.
//!
//! Rule tables carry rows for many crop/variety/season combinations.
//! [`select_rules`] picks the rows for the scenario's crop and falls back to
//! the generic crop rows (variety and season `-1`) when none match exactly.

use std::path::Path;

use agrocast_core::SimulationInputs;
use agrocast_core::phenology::PhenologyParameters;
use agrocast_core::rules::{ManagementRule, WeatherAlertRuleRow};
use agrocast_core::weather_alerts::TrustWindow;
use agrocast_core::weather_feed::DailyWeatherSeries;
use agrocast_types::WeatherDrivers;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::EngineError;

/// Variety or season number of the generic rows of a rule table.
pub const GENERIC: i64 = -1;

/// Measurement height of provider wind speeds (m).
const WIND_MEASUREMENT_HEIGHT_M: f64 = 10.0;

/// Identifies the crop a rule row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropKey {
    /// Crop number.
    pub crop: i64,
    /// Variety number, `-1` for all varieties.
    pub variety: i64,
    /// Season number, `-1` for all seasons.
    pub season: i64,
}

impl CropKey {
    /// The generic rows for this key's crop.
    pub const fn generic(self) -> Self {
        Self {
            crop: self.crop,
            variety: GENERIC,
            season: GENERIC,
        }
    }
}

/// A rule row tagged with the crop it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableRow<T> {
    /// Crop, variety and season of the row.
    #[serde(flatten)]
    pub key: CropKey,
    /// The rule itself.
    #[serde(flatten)]
    pub rule: T,
}

/// Rows chosen from a rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<T> {
    /// The selected rules, in table order.
    pub rules: Vec<T>,
    /// Set when the generic rows were used.
    pub remark: Option<String>,
}

/// Pick the rows of `table` for `key`.
///
/// Exact matches win. Otherwise the crop's generic rows are used and a
/// remark naming `table_name` explains the fallback.
pub fn select_rules<T: Clone>(table: &[TableRow<T>], key: CropKey, table_name: &str) -> Selection<T> {
    let rows_for = |wanted: CropKey| -> Vec<T> {
        table
            .iter()
            .filter(|row| row.key == wanted)
            .map(|row| row.rule.clone())
            .collect()
    };

    let exact = rows_for(key);
    if !exact.is_empty() {
        return Selection {
            rules: exact,
            remark: None,
        };
    }

    let remark = format!(
        "No {table_name} available for variety {} and season {}",
        key.variety, key.season
    );
    warn!(
        crop = key.crop,
        variety = key.variety,
        season = key.season,
        table = table_name,
        "No exact rule rows, using generic crop rows"
    );
    Selection {
        rules: rows_for(key.generic()),
        remark: Some(remark),
    }
}

/// One day of weather in provider units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceWeather {
    /// Calendar day.
    pub day: NaiveDate,
    /// Mean temperature (°C).
    pub temp: f64,
    /// Minimum temperature (°C).
    pub tmin: f64,
    /// Maximum temperature (°C).
    pub tmax: f64,
    /// Vapour pressure (hPa).
    pub vap: f64,
    /// Wind speed at 10 m (m/s).
    pub wind: f64,
    /// Rainfall (mm/day).
    pub rain: f64,
}

impl SourceWeather {
    /// Convert to core units for a site at `latitude`.
    pub fn to_drivers(&self, latitude: f64) -> WeatherDrivers {
        WeatherDrivers {
            day: self.day,
            temp: self.temp,
            tmin: self.tmin,
            tmax: self.tmax,
            vap: self.vap / 10.0,
            wind: wind_at_2m(self.wind),
            rain: self.rain / 10.0,
            lat: latitude,
        }
    }
}

/// Scale a 10 m wind speed to 2 m with the FAO-56 logarithmic profile.
pub fn wind_at_2m(wind_10m: f64) -> f64 {
    let factor = 4.87 / 67.8f64.mul_add(WIND_MEASUREMENT_HEIGHT_M, -5.42).ln();
    wind_10m * factor
}

/// A complete run description as read from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Crop identity used to select rule rows.
    #[serde(flatten)]
    pub crop: CropKey,
    /// Day the crop starts.
    pub start_day: NaiveDate,
    /// Site latitude (decimal degrees).
    pub latitude: f64,
    /// Crop development parameters.
    pub phenology: PhenologyParameters,
    /// Daily weather, any order.
    pub weather: Vec<SourceWeather>,
    /// Weather-alert rule table.
    #[serde(default)]
    pub weather_alerts: Vec<TableRow<WeatherAlertRuleRow>>,
    /// Management rule table.
    #[serde(default)]
    pub management_alerts: Vec<TableRow<ManagementRule>>,
}

/// A scenario resolved into core inputs.
#[derive(Debug)]
pub struct PreparedRun {
    /// Validated weather in core units.
    pub feed: DailyWeatherSeries,
    /// Orchestrator inputs.
    pub inputs: SimulationInputs,
    /// Notes for the output document, such as rule-table fallbacks.
    pub remarks: Vec<String>,
}

impl Scenario {
    /// Read a scenario from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a scenario from a JSON string.
    pub fn parse(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert weather, select rule rows and assemble the orchestrator
    /// inputs.
    pub fn prepare(self, trust: TrustWindow, delt: u32) -> Result<PreparedRun, EngineError> {
        let latitude = self.latitude;
        let feed = DailyWeatherSeries::from_records(
            self.weather.iter().map(|record| record.to_drivers(latitude)),
        )?;

        let weather = select_rules(&self.weather_alerts, self.crop, "weatheralerts");
        let management = select_rules(&self.management_alerts, self.crop, "managementalerts");
        let remarks: Vec<String> = [weather.remark, management.remark]
            .into_iter()
            .flatten()
            .collect();

        info!(
            crop = self.crop.crop,
            variety = self.crop.variety,
            season = self.crop.season,
            start = %self.start_day,
            weather_days = feed.len(),
            weather_rules = weather.rules.len(),
            management_rules = management.rules.len(),
            "Scenario prepared"
        );

        Ok(PreparedRun {
            feed,
            inputs: SimulationInputs {
                start_day: self.start_day,
                delt,
                phenology: self.phenology,
                weather_rules: weather.rules,
                management_rules: management.rules,
                trust,
            },
            remarks,
        })
    }
}
