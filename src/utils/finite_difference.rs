//! Finite difference methods for numerical differentiation.
//!
//! The minimizer falls back to these when a problem has no analytic Jacobian.

use crate::error::{RamanError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Default step size for central differences.
const CENTRAL_EPSILON: f64 = 1e-6;

/// Step for parameter `value`, scaled to its magnitude.
fn step_for(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(RamanError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let eps_j = step_for(params[j], eps);
        let mut params_perturbed = params.clone();
        params_perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&params_perturbed)?;
        let column = (&residuals_perturbed - &residuals) / eps_j;
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}

/// Compute the Jacobian matrix using central finite differences.
///
/// Twice as many evaluations as [`jacobian`], with second-order accuracy.
pub fn jacobian_central(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(CENTRAL_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let eps_j = step_for(params[j], eps);

        let mut forward = params.clone();
        forward[j] += eps_j;
        let mut backward = params.clone();
        backward[j] -= eps_j;

        let r_forward = problem.eval(&forward)?;
        let r_backward = problem.eval(&backward)?;
        if r_forward.len() != n_residuals || r_backward.len() != n_residuals {
            return Err(RamanError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                r_forward.len()
            )));
        }

        let column = (&r_forward - &r_backward) / (2.0 * eps_j);
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // Residuals [x^2, y^2]
    struct TestProblem;

    impl Problem for TestProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(array![params[0].powi(2), params[1].powi(2)])
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_jacobian() {
        let params = array![2.0, 3.0];

        // Analytical Jacobian: [[2*x, 0], [0, 2*y]] = [[4, 0], [0, 6]]
        let jac = jacobian(&TestProblem, &params, None).unwrap();

        assert_eq!(jac.shape(), &[2, 2]);
        assert_relative_eq!(jac[[0, 0]], 4.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[0, 1]], 0.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[1, 0]], 0.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[1, 1]], 6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_jacobian_central() {
        let jac = jacobian_central(&TestProblem, &array![2.0, -3.0], None).unwrap();
        assert_relative_eq!(jac[[0, 0]], 4.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[1, 1]], -6.0, epsilon = 1e-6);
    }
}
