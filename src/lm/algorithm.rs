//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Each iteration solves the damped normal equations
//! `(J^T J + λ D) δ = -J^T r`, with `D = diag(J^T J)` (Marquardt scaling),
//! through a Cholesky factorisation. A step that lowers the sum of squares is
//! accepted and λ shrinks; otherwise λ grows and the step is retried.

use log::trace;
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{RamanError, Result};
use crate::problem::Problem;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

use super::config::{DiffMethod, LmConfig};
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Why the iteration stopped
    pub status: ConvergenceStatus,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Failing to converge is not an error: the best parameters found are
    /// returned with `success == false`. Errors are reserved for problems
    /// that cannot be evaluated at all.
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(RamanError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        if residuals.len() != problem.residual_count() {
            return Err(RamanError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                problem.residual_count(),
                residuals.len()
            )));
        }
        let mut cost = sum_of_squares(&residuals);

        let early = if n_params == 0 {
            Some(ConvergenceStatus::GradientConvergence)
        } else if !cost.is_finite() {
            Some(ConvergenceStatus::NumericalError)
        } else {
            None
        };
        if let Some(status) = early {
            return Ok(self.finish(params, residuals, cost, 0, func_evals, status));
        }

        let criteria = ConvergenceCriteria::from(&self.config);
        let mut lambda = self.config.initial_lambda;
        let mut iterations = 0;

        let status = 'outer: loop {
            let (jacobian, evals) = self.jacobian(problem, &params)?;
            func_evals += evals;

            let jtj = jacobian.t().dot(&jacobian);
            let gradient = jacobian.t().dot(&residuals);
            let gradient_norm = gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
            if gradient_norm < self.config.gtol {
                break ConvergenceStatus::GradientConvergence;
            }

            loop {
                let step = match solve_damped(&jtj, &gradient, lambda) {
                    Some(step) => step,
                    None => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            break 'outer ConvergenceStatus::NumericalError;
                        }
                        continue;
                    }
                };

                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost = sum_of_squares(&new_residuals);

                if new_cost.is_finite() && new_cost < cost {
                    iterations += 1;
                    let status = criteria.check(
                        &params,
                        &new_params,
                        cost,
                        new_cost,
                        gradient_norm,
                        iterations,
                    );
                    trace!(
                        "LM iteration {}: cost {:.6e}, lambda {:.1e}",
                        iterations,
                        new_cost,
                        lambda
                    );

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);

                    if status.is_terminated() {
                        break 'outer status;
                    }
                    break;
                }

                if new_cost.is_finite() && criteria.step_below_xtol(&params, &new_params) {
                    break 'outer ConvergenceStatus::ParameterConvergence;
                }
                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    break 'outer ConvergenceStatus::NoFurtherReduction;
                }
            }
        };

        Ok(self.finish(params, residuals, cost, iterations, func_evals, status))
    }

    fn finish(
        &self,
        params: Array1<f64>,
        residuals: Array1<f64>,
        cost: f64,
        iterations: usize,
        func_evals: usize,
        status: ConvergenceStatus,
    ) -> LmResult {
        LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            status,
            success: status.is_converged(),
            message: status.to_string(),
        }
    }

    /// Jacobian per the configured method, with the evaluations it cost.
    fn jacobian<P: Problem>(
        &self,
        problem: &P,
        params: &Array1<f64>,
    ) -> Result<(Array2<f64>, usize)> {
        let n = params.len();
        match self.config.diff_method {
            DiffMethod::Analytical if problem.has_custom_jacobian() => {
                Ok((problem.jacobian(params)?, 0))
            }
            DiffMethod::CentralDifference => Ok((
                crate::utils::finite_difference::jacobian_central(problem, params, None)?,
                2 * n,
            )),
            _ => Ok((
                crate::utils::finite_difference::jacobian(problem, params, None)?,
                n + 1,
            )),
        }
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Solve `(J^T J + λ diag(J^T J)) δ = -J^T r`; `None` if not positive definite.
fn solve_damped(jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let mut a = jtj.clone();
    for i in 0..a.nrows() {
        a[[i, i]] += lambda * jtj[[i, i]].max(1e-12);
    }

    let rhs = ndarray_vec_to_nalgebra(&gradient.mapv(|g| -g));
    let cholesky = ndarray_to_nalgebra(&a).cholesky()?;
    let step = nalgebra_vec_to_ndarray(&cholesky.solve(&rhs));

    if step.iter().all(|v| v.is_finite()) {
        Some(step)
    } else {
        None
    }
}
