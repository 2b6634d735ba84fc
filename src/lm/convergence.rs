//! Stopping rules for the Levenberg-Marquardt iteration.

use ndarray::Array1;
use std::fmt;

use super::config::LmConfig;

/// Why the solver stopped, or that it has not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    Running,

    /// Relative parameter change fell below `xtol`.
    ParameterConvergence,

    /// Relative change of the sum of squares fell below `ftol`.
    FunctionValueConvergence,

    /// Largest gradient component fell below `gtol`.
    GradientConvergence,

    /// No step reduces the cost, even at maximum damping, while the rejected
    /// steps are still larger than `xtol`.
    NoFurtherReduction,

    MaxIterationsReached,

    /// Non-finite cost or parameters, or a singular system at maximum damping.
    NumericalError,
}

impl ConvergenceStatus {
    pub fn is_terminated(&self) -> bool {
        *self != ConvergenceStatus::Running
    }

    /// True for every stop that leaves a usable minimum.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConvergenceStatus::Running => "Fit still running",
            ConvergenceStatus::ParameterConvergence => {
                "Fit succeeded: parameters changed less than xtol"
            }
            ConvergenceStatus::FunctionValueConvergence => {
                "Fit succeeded: chi-square changed less than ftol"
            }
            ConvergenceStatus::GradientConvergence => "Fit succeeded: gradient below gtol",
            ConvergenceStatus::NoFurtherReduction => {
                "Fit aborted: no further reduction of chi-square possible"
            }
            ConvergenceStatus::MaxIterationsReached => {
                "Fit aborted: maximum number of iterations reached"
            }
            ConvergenceStatus::NumericalError => "Fit aborted: numerical error",
        };
        f.write_str(text)
    }
}

/// Tolerances checked after every accepted step.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    pub xtol: f64,
    pub ftol: f64,
    pub gtol: f64,
    pub max_iterations: usize,
}

impl From<&LmConfig> for ConvergenceCriteria {
    fn from(config: &LmConfig) -> Self {
        Self {
            xtol: config.xtol,
            ftol: config.ftol,
            gtol: config.gtol,
            max_iterations: config.max_iterations,
        }
    }
}

impl ConvergenceCriteria {
    /// Classify the step from `params` to `new_params`.
    ///
    /// Checks run in order: finiteness, gradient, parameter change, cost
    /// change, iteration count.
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        gradient_norm: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        if !new_cost.is_finite() || new_params.iter().any(|v| !v.is_finite()) {
            return ConvergenceStatus::NumericalError;
        }
        if gradient_norm < self.gtol {
            return ConvergenceStatus::GradientConvergence;
        }

        if self.step_below_xtol(params, new_params) {
            return ConvergenceStatus::ParameterConvergence;
        }

        if (cost - new_cost).abs() / cost.max(f64::MIN_POSITIVE) < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }
        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }
        ConvergenceStatus::Running
    }

    /// Whether no parameter moves by more than `xtol` between the two points.
    ///
    /// Also applied to rejected steps: once the damped step is that small the
    /// solution cannot be refined any further.
    pub fn step_below_xtol(&self, params: &Array1<f64>, new_params: &Array1<f64>) -> bool {
        // Relative to the magnitude, or absolute below 1 (band values near zero).
        let param_change = new_params
            .iter()
            .zip(params.iter())
            .map(|(new, old)| (new - old).abs() / old.abs().max(1.0))
            .fold(0.0, f64::max);
        param_change < self.xtol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn criteria() -> ConvergenceCriteria {
        ConvergenceCriteria::from(&LmConfig::default().with_max_iterations(100))
    }

    #[test]
    fn test_check_order() {
        let c = criteria();
        // offset, slope, x0, d0, h0
        let old = array![2.0, 0.01, 520.0, 6.0, 250.0];
        let far = array![2.5, 0.02, 521.0, 6.5, 240.0];
        let near = &old + 1e-12;

        assert_eq!(
            c.check(&old, &near, 10.0, 9.0, 0.1, 5),
            ConvergenceStatus::ParameterConvergence
        );
        assert_eq!(
            c.check(&old, &far, 10.0, 10.0 - 1e-12, 0.1, 5),
            ConvergenceStatus::FunctionValueConvergence
        );
        assert_eq!(
            c.check(&old, &near, 10.0, 9.0, 0.0, 5),
            ConvergenceStatus::GradientConvergence
        );
        assert_eq!(
            c.check(&old, &far, 10.0, 9.0, 0.1, 100),
            ConvergenceStatus::MaxIterationsReached
        );
        assert_eq!(c.check(&old, &far, 10.0, 9.0, 0.1, 5), ConvergenceStatus::Running);
        assert_eq!(
            c.check(&old, &far, 10.0, f64::INFINITY, 0.1, 5),
            ConvergenceStatus::NumericalError
        );
    }

    #[test]
    fn test_no_further_reduction_is_not_success() {
        let stalled = ConvergenceStatus::NoFurtherReduction;
        assert!(!stalled.is_converged());
        assert!(stalled.is_terminated());
        assert!(stalled.to_string().starts_with("Fit aborted"));
        assert!(!ConvergenceStatus::MaxIterationsReached.is_converged());
        assert!(!ConvergenceStatus::NumericalError.is_converged());
        assert!(ConvergenceStatus::FunctionValueConvergence.is_converged());
        assert!(!ConvergenceStatus::Running.is_terminated());
        assert!(ConvergenceStatus::MaxIterationsReached
            .to_string()
            .contains("maximum number of iterations"));
    }

    #[test]
    fn test_step_below_xtol() {
        let c = criteria();
        let old = array![0.5, 520.0];
        assert!(c.step_below_xtol(&old, &array![0.5 + 1e-11, 520.0 + 1e-9]));
        assert!(!c.step_below_xtol(&old, &array![0.5 + 1e-9, 520.0]));
    }
}
