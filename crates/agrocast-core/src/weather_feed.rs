//! Daily weather input.
//!
//! The core reads weather through the [`WeatherFeed`] trait. Records are
//! fully materialized before a run starts; [`DailyWeatherSeries`] is the
//! in-memory implementation and validates every record on construction so
//! a bad value is reported with its day and field before anything is
//! simulated.

use std::collections::BTreeMap;

use agrocast_types::WeatherDrivers;
use chrono::NaiveDate;

/// A weather record failed validation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DriverError {
    /// A field holds NaN or an infinite value.
    #[error("{day}: {field} is not a finite number")]
    NotFinite {
        /// Day of the record.
        day: NaiveDate,
        /// Offending field.
        field: &'static str,
    },

    /// A field is outside its physical range.
    #[error("{day}: {field} = {value} is out of range ({reason})")]
    OutOfRange {
        /// Day of the record.
        day: NaiveDate,
        /// Offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// The violated constraint.
        reason: &'static str,
    },

    /// Two records cover the same day.
    #[error("{day}: more than one weather record")]
    DuplicateDay {
        /// The repeated day.
        day: NaiveDate,
    },
}

/// Source of daily weather drivers for a run.
pub trait WeatherFeed {
    /// First day with a record.
    fn first_day(&self) -> Option<NaiveDate>;

    /// Last day with a record.
    fn last_day(&self) -> Option<NaiveDate>;

    /// The record for `day`, if present.
    fn drivers(&self, day: NaiveDate) -> Option<&WeatherDrivers>;
}

/// Check one record for values the core cannot use.
///
/// # Errors
///
/// Returns [`DriverError`] naming the first offending field.
pub fn validate_drivers(drivers: &WeatherDrivers) -> Result<(), DriverError> {
    let day = drivers.day;
    let fields = [
        ("TEMP", drivers.temp),
        ("TMIN", drivers.tmin),
        ("TMAX", drivers.tmax),
        ("VAP", drivers.vap),
        ("WIND", drivers.wind),
        ("RAIN", drivers.rain),
        ("LAT", drivers.lat),
    ];
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(DriverError::NotFinite { day, field });
        }
    }
    let ranges = [
        ("LAT", drivers.lat, drivers.lat.abs() <= 90.0, "must be within ±90°"),
        ("VAP", drivers.vap, drivers.vap >= 0.0, "must not be negative"),
        ("WIND", drivers.wind, drivers.wind >= 0.0, "must not be negative"),
        ("RAIN", drivers.rain, drivers.rain >= 0.0, "must not be negative"),
        ("TMAX", drivers.tmax, drivers.tmax >= drivers.tmin, "must not be below TMIN"),
    ];
    for (field, value, ok, reason) in ranges {
        if !ok {
            return Err(DriverError::OutOfRange {
                day,
                field,
                value,
                reason,
            });
        }
    }
    Ok(())
}

/// Weather records keyed by day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyWeatherSeries {
    days: BTreeMap<NaiveDate, WeatherDrivers>,
}

impl DailyWeatherSeries {
    /// Build a series from records in any order.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] for an invalid record or a repeated day.
    pub fn from_records(
        records: impl IntoIterator<Item = WeatherDrivers>,
    ) -> Result<Self, DriverError> {
        let mut days = BTreeMap::new();
        for record in records {
            validate_drivers(&record)?;
            let day = record.day;
            if days.insert(day, record).is_some() {
                return Err(DriverError::DuplicateDay { day });
            }
        }
        Ok(Self { days })
    }

    /// Number of days covered.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether the series has no records.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl WeatherFeed for DailyWeatherSeries {
    fn first_day(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    fn last_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    fn drivers(&self, day: NaiveDate) -> Option<&WeatherDrivers> {
        self.days.get(&day)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn record(d: u32) -> WeatherDrivers {
        WeatherDrivers {
            day: day(d),
            temp: 15.0,
            tmin: 8.0,
            tmax: 22.0,
            vap: 1.2,
            wind: 3.0,
            rain: 0.4,
            lat: 51.9,
        }
    }

    #[test]
    fn series_orders_records_by_day() {
        let series = DailyWeatherSeries::from_records([record(3), record(1), record(2)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_day(), Some(day(1)));
        assert_eq!(series.last_day(), Some(day(3)));
        assert!(series.drivers(day(2)).is_some());
        assert!(series.drivers(day(4)).is_none());
    }

    #[test]
    fn duplicate_day_is_rejected() {
        let result = DailyWeatherSeries::from_records([record(1), record(1)]);
        assert_eq!(result, Err(DriverError::DuplicateDay { day: day(1) }));
    }

    #[test]
    fn nan_is_reported_with_day_and_field() {
        let mut bad = record(5);
        bad.tmax = f64::NAN;
        assert_eq!(
            validate_drivers(&bad),
            Err(DriverError::NotFinite {
                day: day(5),
                field: "TMAX"
            })
        );
    }

    #[test]
    fn negative_rain_is_out_of_range() {
        let mut bad = record(6);
        bad.rain = -0.1;
        assert!(matches!(
            validate_drivers(&bad),
            Err(DriverError::OutOfRange { field: "RAIN", .. })
        ));
    }

    #[test]
    fn latitude_must_be_on_earth() {
        let mut bad = record(7);
        bad.lat = 91.0;
        assert!(matches!(
            validate_drivers(&bad),
            Err(DriverError::OutOfRange { field: "LAT", .. })
        ));
    }
}
