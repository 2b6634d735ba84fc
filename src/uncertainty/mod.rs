//! # Uncertainty Calculation
//!
//! Standard errors and correlations of fitted parameters, estimated from the
//! Jacobian at the solution the way lmfit-py does for `leastsq`.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};

use indexmap::IndexMap;
use ndarray::{Array1, Array2};

/// Structure to hold uncertainty calculation results.
#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    /// Covariance matrix for the varying parameters
    pub covariance: Array2<f64>,
    /// Standard errors for each varying parameter
    pub standard_errors: IndexMap<String, f64>,
    /// Correlation matrix derived from covariance
    pub correlation: Array2<f64>,
}

/// Calculator for parameter uncertainties.
#[derive(Debug, Clone)]
pub struct UncertaintyCalculator {
    /// Degrees of freedom (n_points - n_parameters)
    pub nfree: usize,
    /// Chi-square value at minimum
    pub chisqr: f64,
    /// Reduced chi-square (chi^2 / nfree)
    pub redchi: f64,
}

impl UncertaintyCalculator {
    /// Create a new UncertaintyCalculator
    pub fn new(ndata: usize, nvarys: usize, chisqr: f64) -> Self {
        let nfree = if ndata > nvarys { ndata - nvarys } else { 1 };
        let redchi = chisqr / nfree as f64;

        Self {
            nfree,
            chisqr,
            redchi,
        }
    }

    /// Covariance, standard errors and correlations for the named varying
    /// parameters, whose order matches the Jacobian columns.
    ///
    /// `None` when the covariance cannot be estimated.
    pub fn analyse(&self, jacobian: &Array2<f64>, names: &[String]) -> Option<UncertaintyResult> {
        if jacobian.ncols() != names.len() || names.is_empty() {
            return None;
        }

        let covariance = calculate_covariance(jacobian, self.redchi)?;
        let errors: Array1<f64> = standard_errors_from_covariance(&covariance);
        let standard_errors = names.iter().cloned().zip(errors.iter().copied()).collect();
        let correlation = calculate_correlation(&covariance);

        Some(UncertaintyResult {
            covariance,
            standard_errors,
            correlation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_degrees_of_freedom() {
        let calc = UncertaintyCalculator::new(10, 4, 12.0);
        assert_eq!(calc.nfree, 6);
        assert_eq!(calc.redchi, 2.0);

        let calc = UncertaintyCalculator::new(3, 3, 1.0);
        assert_eq!(calc.nfree, 1);
    }

    #[test]
    fn test_analyse_names_errors() {
        let jacobian = arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let calc = UncertaintyCalculator::new(3, 2, 1.0);
        let names = vec!["x0".to_string(), "h0".to_string()];

        let result = calc.analyse(&jacobian, &names).unwrap();
        assert_eq!(
            result.standard_errors.keys().collect::<Vec<_>>(),
            vec!["x0", "h0"]
        );
        assert!(result.standard_errors["x0"] > 0.0);
        assert!(result.correlation[[0, 1]] < 0.0);

        assert!(calc.analyse(&jacobian, &names[..1]).is_none());
    }
}
