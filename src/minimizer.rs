//! Fit one spectrum from a starting parameter set.
//!
//! [`minimize`] runs the bounded Levenberg-Marquardt solver over the varying
//! parameters and then estimates standard errors and correlations from the
//! Jacobian at the solution. Failing to converge is reported in the result,
//! never as an error.

use log::{debug, warn};
use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::lm::{ConvergenceStatus, LevenbergMarquardt, LmConfig};
use crate::model::SpectrumProblem;
use crate::parameters::Parameters;
use crate::problem::Problem;
use crate::problem_params::ParameterProblemAdapter;
use crate::uncertainty::UncertaintyCalculator;

/// Outcome of fitting one spectrum.
#[derive(Debug, Clone)]
pub struct MinimizerResult {
    /// Best-fit parameters, with `stderr` set when it could be estimated
    pub params: Parameters,

    /// The starting parameters
    pub init_params: Parameters,

    /// `observed - model` at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub chisqr: f64,

    /// `chisqr / nfree`
    pub redchi: f64,

    /// Number of residual evaluations
    pub nfev: usize,

    /// Number of data points
    pub ndata: usize,

    /// Number of varying parameters
    pub nvarys: usize,

    /// Names of the varying parameters, in correlation-matrix order
    pub var_names: Vec<String>,

    /// Correlation matrix of the varying parameters
    pub correlation: Option<Array2<f64>>,

    pub status: ConvergenceStatus,

    pub success: bool,

    pub message: String,
}

impl MinimizerResult {
    /// Degrees of freedom, never below one.
    pub fn nfree(&self) -> usize {
        self.ndata.saturating_sub(self.nvarys).max(1)
    }

    /// Akaike information criterion.
    pub fn aic(&self) -> f64 {
        self.log_likelihood_term() + 2.0 * self.nvarys as f64
    }

    /// Bayesian information criterion.
    pub fn bic(&self) -> f64 {
        self.log_likelihood_term() + (self.ndata as f64).ln() * self.nvarys as f64
    }

    fn log_likelihood_term(&self) -> f64 {
        let n = self.ndata as f64;
        n * (self.chisqr.max(1e-250) / n).ln()
    }

    /// Correlation between two varying parameters.
    pub fn correlation_between(&self, a: &str, b: &str) -> Option<f64> {
        let correlation = self.correlation.as_ref()?;
        let i = self.var_names.iter().position(|n| n == a)?;
        let j = self.var_names.iter().position(|n| n == b)?;
        Some(correlation[[i, j]])
    }

    /// Whether standard errors were estimated.
    pub fn errorbars(&self) -> bool {
        self.correlation.is_some()
    }
}

/// Minimize `observed - model(params, frequencies)` over the varying
/// parameters of `params`.
///
/// Only malformed input (length mismatch, empty spectrum) is an error.
pub fn minimize(
    params: &Parameters,
    observed: &Array1<f64>,
    frequencies: &Array1<f64>,
    config: &LmConfig,
) -> Result<MinimizerResult> {
    let problem = SpectrumProblem::new(params.clone(), frequencies, observed)?;
    let adapter = ParameterProblemAdapter::new(&problem);

    let lm = LevenbergMarquardt::with_config(config.clone());
    let result = lm.minimize(&adapter, adapter.initial_internal()?)?;

    let mut best = adapter.parameters_from_internal(&result.params)?;
    let ndata = observed.len();
    let nvarys = adapter.parameter_count();
    let var_names = best.varying_names();

    if !result.success {
        warn!("Fit did not converge: {}", result.message);
    }
    debug!(
        "{} after {} evaluations, chi-square {:.6e}",
        result.message, result.func_evals, result.cost
    );

    let calculator = UncertaintyCalculator::new(ndata, nvarys, result.cost);
    let jacobian = adapter.external_jacobian(&best)?;
    let uncertainty = calculator.analyse(&jacobian, &var_names);
    match &uncertainty {
        Some(uncertainty) => {
            for (name, stderr) in &uncertainty.standard_errors {
                if let Some(param) = best.get_mut(name) {
                    param.set_stderr(Some(*stderr));
                }
            }
        }
        None if nvarys > 0 => debug!("Uncertainties could not be estimated"),
        None => {}
    }

    Ok(MinimizerResult {
        params: best,
        init_params: params.clone(),
        residuals: result.residuals,
        chisqr: result.cost,
        redchi: calculator.redchi,
        nfev: result.func_evals,
        ndata,
        nvarys,
        var_names,
        correlation: uncertainty.map(|u| u.correlation),
        status: result.status,
        success: result.success,
        message: result.message,
    })
}
