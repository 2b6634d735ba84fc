//! A single named fit parameter.
//!
//! A parameter has a value, a vary flag and bounds; after a fit it also
//! carries its standard error.

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Parameter '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Expected {expected} internal values, got {actual}")]
    WrongValueCount { expected: usize, actual: usize },
}

/// Scalar handed to the minimizer: value, vary flag, bounds, standard error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    value: f64,
    pub vary: bool,
    bounds: Bounds,
    /// Set by the minimizer when the covariance could be estimated.
    pub stderr: Option<f64>,
}

impl Parameter {
    /// Unbounded and varying.
    ///
    /// ```
    /// use raman_map::parameters::parameter::Parameter;
    ///
    /// let offset = Parameter::new("offset", 10.0);
    /// assert_eq!(offset.value(), 10.0);
    /// assert!(offset.vary());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            vary: true,
            bounds: Bounds::unbounded(),
            stderr: None,
        }
    }

    /// Bounded and varying; the value is clamped into `[min, max]`.
    ///
    /// ```
    /// use raman_map::parameters::parameter::Parameter;
    ///
    /// let x0 = Parameter::with_bounds("x0", 110.0, 97.0, 103.0).unwrap();
    /// assert_eq!(x0.value(), 103.0);
    /// ```
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        Ok(Self {
            value: bounds.clamp(value),
            bounds,
            ..Self::new(name, value)
        })
    }

    pub fn varying(mut self, vary: bool) -> Self {
        self.vary = vary;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Refused when `value` lies outside the bounds.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.is_within_bounds(value) {
            return Err(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }
            .into());
        }
        self.value = value;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vary(&self) -> bool {
        self.vary
    }

    pub fn set_vary(&mut self, vary: bool) {
        self.vary = vary;
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Replace the bounds and clamp the value into them.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        self.bounds = Bounds::new(min, max)?;
        self.value = self.bounds.clamp(self.value);
        Ok(())
    }

    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn bounds_transform(&self) -> BoundsTransform {
        BoundsTransform::new(self.bounds)
    }

    /// Value in the minimizer's unbounded coordinate.
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        Ok(self.bounds_transform().to_internal(self.value)?)
    }

    pub fn from_internal(&self, internal: f64) -> f64 {
        self.bounds_transform().to_external(internal)
    }
}
