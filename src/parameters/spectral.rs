//! Structured parameters of the spectral model.
//!
//! Fits are set up with a [`SpectralParameters`] record and only flattened
//! into the name-keyed [`Parameters`] form (`offset`, `slope`, `x{i}`, `d{i}`,
//! `h{i}`) at the minimizer boundary.

use crate::error::{RamanError, Result};
use crate::parameters::bounds::Bounds;
use crate::parameters::parameter::Parameter;
use crate::parameters::parameters::Parameters;
use serde::{Deserialize, Serialize};

pub const OFFSET: &str = "offset";
pub const SLOPE: &str = "slope";

/// Name of the position parameter of band `i`.
pub fn position_name(i: usize) -> String {
    format!("x{}", i)
}

/// Name of the decay (full width) parameter of band `i`.
pub fn decay_name(i: usize) -> String {
    format!("d{}", i)
}

/// Name of the intensity parameter of band `i`.
pub fn intensity_name(i: usize) -> String {
    format!("h{}", i)
}

/// Number of bands described by a flat parameter set.
pub fn band_count(params: &Parameters) -> usize {
    params.len().saturating_sub(2) / 3
}

/// One scalar of the model with its fitting setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub value: f64,
    pub vary: bool,
    pub bounds: Bounds,
}

impl ParamSpec {
    /// Unbounded, varying.
    pub fn free(value: f64) -> Self {
        Self {
            value,
            vary: true,
            bounds: Bounds::unbounded(),
        }
    }

    /// Unbounded, held constant.
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            vary: false,
            bounds: Bounds::unbounded(),
        }
    }

    /// Varying, bounded below by zero.
    pub fn non_negative(value: f64) -> Self {
        Self {
            value,
            vary: true,
            bounds: Bounds::min_only(0.0),
        }
    }

    pub fn with_vary(mut self, vary: bool) -> Self {
        self.vary = vary;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    fn to_parameter(&self, name: &str) -> Result<Parameter> {
        let param = Parameter::with_bounds(name, self.value, self.bounds.min, self.bounds.max)?;
        Ok(param.varying(self.vary))
    }

    fn from_parameter(param: &Parameter) -> Self {
        Self {
            value: param.value(),
            vary: param.vary(),
            bounds: *param.bounds(),
        }
    }
}

/// Position, decay and intensity of one Lorentzian band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSpec {
    pub position: ParamSpec,
    pub decay: ParamSpec,
    pub intensity: ParamSpec,
}

/// Linear baseline plus Lorentzian bands, in band order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralParameters {
    pub offset: ParamSpec,
    pub slope: ParamSpec,
    pub peaks: Vec<PeakSpec>,
}

impl SpectralParameters {
    pub fn new(offset: ParamSpec, slope: ParamSpec) -> Self {
        Self {
            offset,
            slope,
            peaks: Vec::new(),
        }
    }

    pub fn push_peak(&mut self, peak: PeakSpec) {
        self.peaks.push(peak);
    }

    pub fn band_count(&self) -> usize {
        self.peaks.len()
    }

    /// Flatten into `offset`, `slope`, then `x{i}`, `d{i}`, `h{i}` per band.
    ///
    /// Values outside their bounds are clamped into them.
    pub fn to_parameters(&self) -> Result<Parameters> {
        let mut params = Parameters::new();
        params.add(self.offset.to_parameter(OFFSET)?)?;
        params.add(self.slope.to_parameter(SLOPE)?)?;
        for (i, peak) in self.peaks.iter().enumerate() {
            params.add(peak.position.to_parameter(&position_name(i))?)?;
            params.add(peak.decay.to_parameter(&decay_name(i))?)?;
            params.add(peak.intensity.to_parameter(&intensity_name(i))?)?;
        }
        Ok(params)
    }

    /// Parse the flat form back; the band count is `(len - 2) / 3`.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let get = |name: &str| {
            params
                .get(name)
                .map(ParamSpec::from_parameter)
                .ok_or_else(|| RamanError::ParameterNotFound(name.to_string()))
        };

        let mut spectral = Self::new(get(OFFSET)?, get(SLOPE)?);
        for i in 0..band_count(params) {
            spectral.push_peak(PeakSpec {
                position: get(&position_name(i))?,
                decay: get(&decay_name(i))?,
                intensity: get(&intensity_name(i))?,
            });
        }
        Ok(spectral)
    }
}
