//! Parameter bounds.
//!
//! Bounds limit the values a fit parameter may take. The optimizer never sees
//! them directly: [`BoundsTransform`] maps bounded external values onto an
//! unconstrained internal coordinate (the Minuit transform, as used by lmfit).

use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Value {value} lies outside [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Bounded value must be finite")]
    InfiniteValue,
}

/// Closed interval `[min, max]`; either side may be infinite.
///
/// In JSON an open side is written as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoundsRepr", into = "BoundsRepr")]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Serialize, Deserialize)]
struct BoundsRepr {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

impl From<BoundsRepr> for Bounds {
    fn from(repr: BoundsRepr) -> Self {
        Self {
            min: repr.min.unwrap_or(NEG_INFINITY),
            max: repr.max.unwrap_or(INFINITY),
        }
    }
}

impl From<Bounds> for BoundsRepr {
    fn from(bounds: Bounds) -> Self {
        Self {
            min: bounds.has_lower_bound().then_some(bounds.min),
            max: bounds.has_upper_bound().then_some(bounds.max),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// ```
    /// use raman_map::parameters::bounds::Bounds;
    ///
    /// let decay = Bounds::new(3.0, 9.0).unwrap();
    /// assert!(decay.is_within_bounds(6.0));
    /// assert!(Bounds::new(9.0, 3.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min > max || min.is_nan() || max.is_nan() {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }

    pub fn min_only(min: f64) -> Self {
        Self { min, max: INFINITY }
    }

    /// `center ± half_width`, the window a map fit may drift within.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self {
            min: center - half_width,
            max: center + half_width,
        }
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Minuit mapping between a bounded external value and a free internal one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    fn sides(&self) -> (bool, bool) {
        (self.bounds.has_lower_bound(), self.bounds.has_upper_bound())
    }

    pub fn to_external(&self, u: f64) -> f64 {
        let Bounds { min, max } = self.bounds;
        match self.sides() {
            (false, false) => u,
            (true, false) => min - 1.0 + u.hypot(1.0),
            (false, true) => max + 1.0 - u.hypot(1.0),
            (true, true) => min + (u.sin() + 1.0) * (max - min) / 2.0,
        }
    }

    /// Fails for values outside the bounds.
    pub fn to_internal(&self, value: f64) -> Result<f64, BoundsError> {
        let Bounds { min, max } = self.bounds;
        if !value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }
        if !self.bounds.is_within_bounds(value) {
            return Err(BoundsError::ValueOutsideBounds { value, min, max });
        }

        Ok(match self.sides() {
            (false, false) => value,
            (true, false) => ((value - min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((max - value + 1.0).powi(2) - 1.0).sqrt(),
            // Zero-width windows pin the value; any internal coordinate works.
            (true, true) if max == min => 0.0,
            (true, true) => (2.0 * (value - min) / (max - min) - 1.0).clamp(-1.0, 1.0).asin(),
        })
    }

    /// `d external / d internal`, used to carry an analytic Jacobian into
    /// internal coordinates.
    pub fn external_derivative(&self, u: f64) -> f64 {
        let Bounds { min, max } = self.bounds;
        match self.sides() {
            (false, false) => 1.0,
            (true, false) => u / u.hypot(1.0),
            (false, true) => -u / u.hypot(1.0),
            (true, true) => (max - min) * u.cos() / 2.0,
        }
    }
}
