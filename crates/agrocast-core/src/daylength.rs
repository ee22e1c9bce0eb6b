//! Astronomical day length and photoperiod reduction.
//!
//! Day length is counted from the moment the sun's centre is 4° below the
//! horizon in the morning to the same moment in the evening, which is the
//! photoperiodically active day length used by crop models.

use chrono::{Datelike, NaiveDate};

use crate::phenology::PhenologyError;

/// Solar elevation (degrees) that bounds the photoperiodic day.
const SUN_ANGLE_DEG: f64 = -4.0;

/// Maximum declination of the sun (degrees).
const MAX_DECLINATION_DEG: f64 = 23.45;

/// Photoperiodically active day length in hours.
///
/// Returns 24.0 during polar day and 0.0 during polar night.
pub fn day_length(latitude: f64, day: NaiveDate) -> f64 {
    let doy = f64::from(day.ordinal());
    let declination = -(MAX_DECLINATION_DEG.to_radians().sin()
        * (2.0 * core::f64::consts::PI * (doy + 10.0) / 365.0).cos())
    .asin();

    let lat = latitude.to_radians();
    let sinld = lat.sin() * declination.sin();
    let cosld = lat.cos() * declination.cos();
    let aob = (-SUN_ANGLE_DEG.to_radians().sin() + sinld) / cosld;

    if aob > 1.0 {
        24.0
    } else if aob < -1.0 {
        0.0
    } else {
        12.0 * (1.0 + 2.0 * aob.asin() / core::f64::consts::PI)
    }
}

/// Photoperiod response of the crop.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct PhotoperiodParams {
    /// Sensitivity flag: values of 1 or more make development day-length
    /// dependent.
    pub sensitivity: i32,
    /// Critical day length (hours): development stops at or below.
    pub critical_day_length: f64,
    /// Optimal day length (hours): no reduction at or above.
    pub optimal_day_length: f64,
}

impl PhotoperiodParams {
    /// Parameters for a day-neutral crop.
    pub const fn insensitive() -> Self {
        Self {
            sensitivity: 0,
            critical_day_length: 0.0,
            optimal_day_length: 24.0,
        }
    }

    /// Whether day length influences development.
    pub const fn is_sensitive(&self) -> bool {
        self.sensitivity >= 1
    }

    /// Check the thresholds of a sensitive crop.
    ///
    /// # Errors
    ///
    /// Returns [`PhenologyError::InvalidPhotoperiod`] if a threshold is not
    /// finite or the two thresholds are equal.
    pub fn validate(&self) -> Result<(), PhenologyError> {
        if !self.is_sensitive() {
            return Ok(());
        }
        let critical = self.critical_day_length;
        let optimal = self.optimal_day_length;
        if !critical.is_finite() || !optimal.is_finite() || (optimal - critical).abs() < f64::EPSILON
        {
            return Err(PhenologyError::InvalidPhotoperiod { critical, optimal });
        }
        Ok(())
    }

    /// Development reduction factor in `[0, 1]` for the given day length.
    pub fn reduction_factor(&self, day_length_hours: f64) -> f64 {
        if !self.is_sensitive() {
            return 1.0;
        }
        let span = self.optimal_day_length - self.critical_day_length;
        ((day_length_hours - self.critical_day_length) / span).clamp(0.0, 1.0)
    }
}

impl Default for PhotoperiodParams {
    fn default() -> Self {
        Self::insensitive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn equator_is_about_twelve_hours() {
        let hours = day_length(0.0, date(2024, 3, 20));
        assert!(hours > 12.0 && hours < 12.8, "got {hours}");
    }

    #[test]
    fn northern_summer_is_longer_than_winter() {
        let summer = day_length(52.0, date(2024, 6, 21));
        let winter = day_length(52.0, date(2024, 12, 21));
        assert!(summer > 16.0, "got {summer}");
        assert!(winter < 9.0, "got {winter}");
    }

    #[test]
    fn polar_day_and_night_saturate() {
        assert!((day_length(80.0, date(2024, 6, 21)) - 24.0).abs() < f64::EPSILON);
        assert!(day_length(80.0, date(2024, 12, 21)).abs() < f64::EPSILON);
    }

    #[test]
    fn insensitive_crop_is_never_reduced() {
        let params = PhotoperiodParams::insensitive();
        assert!((params.reduction_factor(2.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sensitive_crop_maps_day_length_onto_unit_interval() {
        let params = PhotoperiodParams {
            sensitivity: 1,
            critical_day_length: 8.0,
            optimal_day_length: 16.0,
        };
        assert!(params.reduction_factor(6.0).abs() < f64::EPSILON);
        assert!((params.reduction_factor(12.0) - 0.5).abs() < 1e-9);
        assert!((params.reduction_factor(18.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_thresholds_are_rejected_for_sensitive_crops() {
        let params = PhotoperiodParams {
            sensitivity: 2,
            critical_day_length: 12.0,
            optimal_day_length: 12.0,
        };
        assert!(params.validate().is_err());
        let neutral = PhotoperiodParams {
            sensitivity: 0,
            ..params
        };
        assert!(neutral.validate().is_ok());
    }
}
