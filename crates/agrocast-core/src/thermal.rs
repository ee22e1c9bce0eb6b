//! Piecewise-linear thermal response function.
//!
//! The development rate of a crop responds to temperature through four
//! cardinal points: no development below the base temperature, a linear
//! rise to the lower optimum, a plateau to the upper optimum, and a linear
//! decline to zero at the maximum temperature.

/// Errors raised when building a response function.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThermalError {
    /// Fewer than two control points were supplied.
    #[error("a response function needs at least two control points, got {count}")]
    TooFewPoints {
        /// Number of points supplied.
        count: usize,
    },

    /// Control-point temperatures are not strictly increasing.
    #[error("control-point temperatures must be strictly increasing: {previous} then {next}")]
    NotIncreasing {
        /// The earlier temperature.
        previous: f64,
        /// The temperature that did not exceed it.
        next: f64,
    },

    /// A control point is NaN or infinite.
    #[error("control point ({temperature}, {rate}) is not finite")]
    NotFinite {
        /// Temperature of the bad point.
        temperature: f64,
        /// Rate of the bad point.
        rate: f64,
    },
}

/// Cardinal temperatures of a crop's development response (°C).
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct CardinalTemperatures {
    /// Base temperature: no development at or below.
    pub base: f64,
    /// Start of the optimum plateau.
    pub optimum_low: f64,
    /// End of the optimum plateau.
    pub optimum_high: f64,
    /// Maximum temperature: no development at or above.
    pub maximum: f64,
}

/// An ordered set of (temperature, rate) control points.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalResponseFunction {
    points: Vec<(f64, f64)>,
}

impl ThermalResponseFunction {
    /// Build from explicit control points.
    ///
    /// # Errors
    ///
    /// Returns [`ThermalError`] if there are fewer than two points, a point is
    /// not finite, or temperatures are not strictly increasing.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, ThermalError> {
        if points.len() < 2 {
            return Err(ThermalError::TooFewPoints {
                count: points.len(),
            });
        }
        for &(temperature, rate) in &points {
            if !temperature.is_finite() || !rate.is_finite() {
                return Err(ThermalError::NotFinite { temperature, rate });
            }
        }
        for pair in points.windows(2) {
            if let [(previous, _), (next, _)] = pair
                && next <= previous
            {
                return Err(ThermalError::NotIncreasing {
                    previous: *previous,
                    next: *next,
                });
            }
        }
        Ok(Self { points })
    }

    /// Build the four-point function from cardinal temperatures.
    ///
    /// The plateau height is `optimum_low - base`, so one day on the plateau
    /// contributes that many degree-days.
    ///
    /// # Errors
    ///
    /// Returns [`ThermalError::NotIncreasing`] unless
    /// `base < optimum_low < optimum_high < maximum`.
    pub fn from_cardinal(cardinal: &CardinalTemperatures) -> Result<Self, ThermalError> {
        let plateau = cardinal.optimum_low - cardinal.base;
        Self::new(vec![
            (cardinal.base, 0.0),
            (cardinal.optimum_low, plateau),
            (cardinal.optimum_high, plateau),
            (cardinal.maximum, 0.0),
        ])
    }

    /// The control points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Evaluate at `temperature` by linear interpolation.
    ///
    /// Outside the range of control-point temperatures the result is 0.
    pub fn evaluate(&self, temperature: f64) -> f64 {
        if !temperature.is_finite() {
            return 0.0;
        }
        for pair in self.points.windows(2) {
            let [(t0, r0), (t1, r1)] = pair else {
                continue;
            };
            if temperature >= *t0 && temperature <= *t1 {
                let span = t1 - t0;
                let fraction = (temperature - t0) / span;
                return fraction.mul_add(r1 - r0, *r0);
            }
        }
        0.0
    }
}
