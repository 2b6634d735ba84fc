//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating and manipulating covariance
//! matrices from Jacobian matrices in nonlinear least-squares optimization.

use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};
use ndarray::{Array1, Array2};

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = redchi * inv(J^T * J)
/// where:
///   - J is the Jacobian matrix
///   - redchi is the reduced chi-square (chi^2 / dof)
///
/// Returns `None` when `J^T J` is singular, e.g. when a parameter has no
/// influence on the residuals.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Option<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let inverse = ndarray_to_nalgebra(&jtj).try_inverse()?;

    let covar = nalgebra_to_ndarray(&inverse) * redchi;
    if covar.iter().all(|v| v.is_finite()) {
        Some(covar)
    } else {
        None
    }
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else {
            let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
            if denom > 0.0 {
                covar[[i, j]] / denom
            } else {
                0.0
            }
        }
    })
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        // 2 parameters, 3 data points
        let jacobian = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let covar = calculate_covariance(&jacobian, 2.0).unwrap();
        assert_eq!(covar.shape(), &[2, 2]);

        // J^T J = [[35, 44], [44, 56]], det = 24
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 0]], covar[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn test_singular_jacobian_has_no_covariance() {
        let jacobian = arr2(&[[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        assert!(calculate_covariance(&jacobian, 1.0).is_none());
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);

        let correl = calculate_correlation(&covar);
        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);

        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors_from_covariance() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);

        let errors = standard_errors_from_covariance(&covar);
        assert_eq!(errors.len(), 2);
        assert_relative_eq!(errors[0], 0.1f64.sqrt(), epsilon = 1e-10);
        assert_relative_eq!(errors[1], 0.2f64.sqrt(), epsilon = 1e-10);
    }
}
