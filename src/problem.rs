//! Least-squares problems as seen by the Levenberg-Marquardt solver.
//!
//! Problems work in the optimizer's unconstrained coordinates; see
//! [`crate::problem_params`] for the adapter that exposes bounded, named
//! parameters this way.

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Residuals `r(p)` whose sum of squares is minimized.
pub trait Problem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    fn parameter_count(&self) -> usize;

    fn residual_count(&self) -> usize;

    /// `J[i, j] = d r_i / d p_j`; forward differences unless overridden.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// True when [`Problem::jacobian`] is analytic.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Straight line `a*x + b` against fixed data.
    struct LineProblem {
        x: Array1<f64>,
        y: Array1<f64>,
    }

    impl Problem for LineProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(&self.y - &(&self.x * params[0] + params[1]))
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }
    }

    #[test]
    fn test_default_cost_and_jacobian() {
        let problem = LineProblem {
            x: array![0.0, 1.0, 2.0],
            y: array![1.0, 3.0, 5.0],
        };

        assert_relative_eq!(problem.eval_cost(&array![2.0, 1.0]).unwrap(), 0.0);
        assert_relative_eq!(problem.eval_cost(&array![2.0, 0.0]).unwrap(), 3.0);

        let jac = problem.jacobian(&array![2.0, 1.0]).unwrap();
        assert_eq!(jac.shape(), &[3, 2]);
        assert_relative_eq!(jac[[2, 0]], -2.0, epsilon = 1e-5);
        assert_relative_eq!(jac[[1, 1]], -1.0, epsilon = 1e-5);
        assert!(!problem.has_custom_jacobian());
    }
}
