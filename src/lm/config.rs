//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the convergence tolerances, the damping schedule and
//! the Jacobian method of the solver.

use serde::{Deserialize, Serialize};

/// Method for calculating the Jacobian matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiffMethod {
    /// Use forward finite differences
    FiniteDifference,

    /// Use central finite differences (twice the evaluations, more accurate)
    CentralDifference,

    /// Use the analytical Jacobian provided by the problem implementation,
    /// falling back to forward differences when it has none
    #[default]
    Analytical,
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 200
    pub max_iterations: usize,

    /// Relative tolerance for change in the sum of squares. Default: 1e-10
    pub ftol: f64,

    /// Relative tolerance for change in parameter values. Default: 1e-10
    pub xtol: f64,

    /// Tolerance for the largest gradient component. Default: 1e-12
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e12
    pub max_lambda: f64,

    /// Method to use for calculating the Jacobian. Default: Analytical
    pub diff_method: DiffMethod,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            diff_method: DiffMethod::default(),
        }
    }
}

impl LmConfig {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in the sum of squares.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set the factors by which lambda grows after a rejected step and
    /// shrinks after an accepted one.
    pub fn with_lambda_factors(mut self, up: f64, down: f64) -> Self {
        self.lambda_up_factor = up;
        self.lambda_down_factor = down;
        self
    }

    /// Set the method used for calculating the Jacobian.
    pub fn with_differentiation_method(mut self, method: DiffMethod) -> Self {
        self.diff_method = method;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LmConfig::default()
            .with_max_iterations(50)
            .with_ftol(1e-6)
            .with_lambda_factors(4.0, 0.25)
            .with_differentiation_method(DiffMethod::CentralDifference);

        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.ftol, 1e-6);
        assert_eq!(config.lambda_up_factor, 4.0);
        assert_eq!(config.lambda_down_factor, 0.25);
        assert_eq!(config.diff_method, DiffMethod::CentralDifference);
        assert_eq!(config.xtol, LmConfig::default().xtol);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LmConfig = serde_json::from_str(r#"{"max_iterations": 10}"#).unwrap();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.diff_method, DiffMethod::Analytical);
        assert_eq!(config.initial_lambda, 1e-3);
    }
}
