//! The spectral model: a linear baseline plus a sum of Lorentzian bands.
//!
//! ```text
//! y(f) = offset + slope * f + Σ_b h_b (0.5 d_b)² / ((f - p_b)² + (0.5 d_b)²)
//! ```
//!
//! `p_b` is the band position, `d_b` its full width at half maximum (the
//! "decay") and `h_b` its peak height. A band of zero width is a spike of
//! height `h_b` at exactly `f == p_b`, so evaluation never produces NaN.
//!
//! [`SpectrumProblem`] adapts the model and one observed spectrum to the
//! minimizer, with the analytic Jacobian.

use crate::error::{RamanError, Result};
use crate::parameters::spectral::{
    band_count, decay_name, intensity_name, position_name, OFFSET, SLOPE,
};
use crate::parameters::{Parameters, SpectralParameters};
use crate::problem_params::ParameterProblem;
use ndarray::{Array1, Array2, Zip};

/// Shape values of one band, as read from a flat parameter set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandShape {
    pub position: f64,
    pub decay: f64,
    pub intensity: f64,
}

impl BandShape {
    /// Height of this band at frequency `f`.
    pub fn value_at(&self, f: f64) -> f64 {
        lorentzian(f, self.position, self.decay, self.intensity)
    }
}

/// Lorentzian of full width `decay` and peak height `intensity` centred on
/// `position`.
pub fn lorentzian(f: f64, position: f64, decay: f64, intensity: f64) -> f64 {
    let half = 0.5 * decay;
    if half == 0.0 {
        return if f == position { intensity } else { 0.0 };
    }
    let dx = f - position;
    intensity * half * half / (dx * dx + half * half)
}

/// Evaluates the baseline + Lorentzian model from flat parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralModel;

impl SpectralModel {
    /// Offset and slope of the baseline.
    pub fn baseline_coefficients(params: &Parameters) -> Result<(f64, f64)> {
        Ok((params.value(OFFSET)?, params.value(SLOPE)?))
    }

    /// Bands in order; the count is inferred as `(len - 2) / 3`.
    pub fn bands(params: &Parameters) -> Result<Vec<BandShape>> {
        (0..band_count(params))
            .map(|i| {
                Ok(BandShape {
                    position: params.value(&position_name(i))?,
                    decay: params.value(&decay_name(i))?,
                    intensity: params.value(&intensity_name(i))?,
                })
            })
            .collect()
    }

    /// Full model at every frequency.
    pub fn evaluate(params: &Parameters, frequencies: &Array1<f64>) -> Result<Array1<f64>> {
        let mut y = Self::baseline(params, frequencies)?;
        for band in Self::bands(params)? {
            Zip::from(&mut y)
                .and(frequencies)
                .for_each(|y, &f| *y += band.value_at(f));
        }
        Ok(y)
    }

    /// Full model from the structured record.
    pub fn evaluate_spectral(
        spectral: &SpectralParameters,
        frequencies: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        Self::evaluate(&spectral.to_parameters()?, frequencies)
    }

    /// `observed - model`; lengths must match.
    pub fn cost(
        params: &Parameters,
        observed: &Array1<f64>,
        frequencies: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        if observed.len() != frequencies.len() {
            return Err(RamanError::DimensionMismatch(format!(
                "{} observed intensities for {} frequencies",
                observed.len(),
                frequencies.len()
            )));
        }
        Ok(observed - &Self::evaluate(params, frequencies)?)
    }

    /// `offset + slope * f`.
    pub fn baseline(params: &Parameters, frequencies: &Array1<f64>) -> Result<Array1<f64>> {
        let (offset, slope) = Self::baseline_coefficients(params)?;
        Ok(frequencies.mapv(|f| offset + slope * f))
    }

    /// Baseline plus band `index` alone.
    pub fn band_curve(
        params: &Parameters,
        index: usize,
        frequencies: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        let bands = Self::bands(params)?;
        let band = bands
            .get(index)
            .ok_or_else(|| RamanError::BandNotFound(format!("B{}", index)))?;
        let (offset, slope) = Self::baseline_coefficients(params)?;
        Ok(frequencies.mapv(|f| offset + slope * f + band.value_at(f)))
    }

    /// Derivatives of the model with respect to every parameter, one column
    /// per parameter in collection order.
    pub fn jacobian(params: &Parameters, frequencies: &Array1<f64>) -> Result<Array2<f64>> {
        let bands = Self::bands(params)?;
        let mut jac = Array2::zeros((frequencies.len(), params.len()));

        for (mut column, name) in jac.columns_mut().into_iter().zip(params.names()) {
            match name.as_str() {
                OFFSET => column.fill(1.0),
                SLOPE => column.assign(frequencies),
                _ => {
                    let (field, band) = band_field(&name)
                        .and_then(|(field, i)| bands.get(i).map(|band| (field, band)))
                        .ok_or_else(|| RamanError::ParameterNotFound(name.clone()))?;
                    Zip::from(&mut column)
                        .and(frequencies)
                        .for_each(|d, &f| *d = band.derivative(field, f));
                }
            }
        }

        Ok(jac)
    }
}

/// Which band value a flat parameter name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeField {
    Position,
    Decay,
    Intensity,
}

/// Split `x3`, `d3` or `h3` into its field and band index.
fn band_field(name: &str) -> Option<(ShapeField, usize)> {
    let field = match name.chars().next()? {
        'x' => ShapeField::Position,
        'd' => ShapeField::Decay,
        'h' => ShapeField::Intensity,
        _ => return None,
    };
    let index = name[1..].parse::<usize>().ok()?;
    (name[1..] == index.to_string()).then_some((field, index))
}

impl BandShape {
    /// Partial derivative of [`BandShape::value_at`] with respect to `field`.
    fn derivative(&self, field: ShapeField, f: f64) -> f64 {
        let half = 0.5 * self.decay;
        if half == 0.0 {
            return 0.0;
        }
        let g2 = half * half;
        let dx = f - self.position;
        let denom = dx * dx + g2;
        match field {
            ShapeField::Position => self.intensity * g2 * 2.0 * dx / (denom * denom),
            ShapeField::Decay => self.intensity * half * dx * dx / (denom * denom),
            ShapeField::Intensity => g2 / denom,
        }
    }
}

/// One observed spectrum to be fitted from a starting parameter set.
#[derive(Debug, Clone)]
pub struct SpectrumProblem<'a> {
    params: Parameters,
    frequencies: &'a Array1<f64>,
    observed: &'a Array1<f64>,
}

impl<'a> SpectrumProblem<'a> {
    pub fn new(
        params: Parameters,
        frequencies: &'a Array1<f64>,
        observed: &'a Array1<f64>,
    ) -> Result<Self> {
        if frequencies.is_empty() {
            return Err(RamanError::NoData("empty spectrum".to_string()));
        }
        if frequencies.len() != observed.len() {
            return Err(RamanError::DimensionMismatch(format!(
                "{} observed intensities for {} frequencies",
                observed.len(),
                frequencies.len()
            )));
        }
        Ok(Self {
            params,
            frequencies,
            observed,
        })
    }

    pub fn frequencies(&self) -> &Array1<f64> {
        self.frequencies
    }

    pub fn observed(&self) -> &Array1<f64> {
        self.observed
    }
}

impl ParameterProblem for SpectrumProblem<'_> {
    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn residual_count(&self) -> usize {
        self.observed.len()
    }

    fn eval_with_parameters(&self, params: &Parameters) -> Result<Array1<f64>> {
        SpectralModel::cost(params, self.observed, self.frequencies)
    }

    fn jacobian_with_parameters(&self, params: &Parameters) -> Result<Array2<f64>> {
        // Residuals are observed - model
        Ok(-SpectralModel::jacobian(params, self.frequencies)?)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn one_band(offset: f64, slope: f64, x: f64, d: f64, h: f64) -> Parameters {
        let mut params = Parameters::new();
        params.add_param("offset", offset).unwrap();
        params.add_param("slope", slope).unwrap();
        params.add_param("x0", x).unwrap();
        params.add_param("d0", d).unwrap();
        params.add_param("h0", h).unwrap();
        params
    }

    #[test]
    fn test_band_height_at_center() {
        let params = one_band(0.0, 0.0, 100.0, 4.0, 5.0);
        let y = SpectralModel::evaluate(&params, &array![100.0]).unwrap();
        assert_eq!(y[0], 5.0);

        // Half maximum at ± d/2
        let y = SpectralModel::evaluate(&params, &array![98.0, 102.0]).unwrap();
        assert_relative_eq!(y[0], 2.5, epsilon = 1e-12);
        assert_relative_eq!(y[1], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_baseline_only() {
        let mut params = Parameters::new();
        params.add_param("offset", -50.0).unwrap();
        params.add_param("slope", 1.0).unwrap();
        let y = SpectralModel::evaluate(&params, &array![100.0, 200.0]).unwrap();
        assert_eq!(y, array![50.0, 150.0]);
    }

    #[test]
    fn test_zero_width_band_is_finite() {
        let params = one_band(1.0, 0.0, 100.0, 0.0, 5.0);
        let y = SpectralModel::evaluate(&params, &array![99.0, 100.0, 101.0]).unwrap();
        assert_eq!(y, array![1.0, 6.0, 1.0]);
        assert!(SpectralModel::jacobian(&params, &array![100.0])
            .unwrap()
            .iter()
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_cost_length_mismatch() {
        let params = one_band(0.0, 0.0, 100.0, 4.0, 5.0);
        let result = SpectralModel::cost(&params, &array![1.0], &array![1.0, 2.0]);
        assert!(matches!(result, Err(RamanError::DimensionMismatch(_))));
    }

    #[test]
    fn test_band_curve_sits_on_baseline() {
        let params = one_band(2.0, 0.0, 100.0, 4.0, 5.0);
        let curve = SpectralModel::band_curve(&params, 0, &array![100.0, 1000.0]).unwrap();
        assert_eq!(curve[0], 7.0);
        assert_relative_eq!(curve[1], 2.0, epsilon = 1e-3);
        assert!(SpectralModel::band_curve(&params, 1, &array![100.0]).is_err());
    }

    #[test]
    fn test_analytic_jacobian_matches_finite_difference() {
        let params = one_band(1.0, 0.01, 100.0, 6.0, 30.0);
        let f = Array1::linspace(90.0, 110.0, 21);
        let jac = SpectralModel::jacobian(&params, &f).unwrap();

        let names = params.names();
        let eps = 1e-6;
        for (col, name) in names.iter().enumerate() {
            let mut shifted = params.clone();
            let value = shifted.value(name).unwrap();
            shifted.get_mut(name).unwrap().set_value(value + eps).unwrap();
            let numeric = (SpectralModel::evaluate(&shifted, &f).unwrap()
                - SpectralModel::evaluate(&params, &f).unwrap())
                / eps;
            for i in 0..f.len() {
                assert_relative_eq!(jac[[i, col]], numeric[i], epsilon = 1e-3, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn test_jacobian_columns_follow_parameter_order() {
        let canonical = one_band(1.0, 0.01, 100.0, 6.0, 30.0);
        let mut reordered = Parameters::new();
        for name in ["h0", "x0", "slope", "d0", "offset"] {
            reordered.add(canonical.get(name).unwrap().clone()).unwrap();
        }
        let f = Array1::linspace(90.0, 110.0, 21);
        let expected = SpectralModel::jacobian(&canonical, &f).unwrap();
        let jac = SpectralModel::jacobian(&reordered, &f).unwrap();

        for (col, name) in reordered.names().iter().enumerate() {
            let source = canonical.names().iter().position(|n| n == name).unwrap();
            assert_eq!(jac.column(col), expected.column(source), "{}", name);
        }
    }

    #[test]
    fn test_jacobian_rejects_foreign_names() {
        for extra in ["w0", "x00"] {
            let mut params = one_band(1.0, 0.01, 100.0, 6.0, 30.0);
            params.add_param(extra, 1.0).unwrap();
            assert!(matches!(
                SpectralModel::jacobian(&params, &array![100.0]),
                Err(RamanError::ParameterNotFound(_))
            ));
        }
    }

    #[test]
    fn test_spectrum_problem_checks_shape() {
        let params = one_band(0.0, 0.0, 100.0, 4.0, 5.0);
        let f = array![1.0, 2.0];
        let y = array![1.0];
        assert!(SpectrumProblem::new(params.clone(), &f, &y).is_err());

        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            SpectrumProblem::new(params, &empty, &empty),
            Err(RamanError::NoData(_))
        ));
    }
}
