//! Integration of the Problem trait with the Parameters system
//!
//! A [`ParameterProblem`] is written against named, bounded [`Parameters`].
//! [`ParameterProblemAdapter`] exposes it to the optimizer as a plain
//! [`Problem`] over the internal (unconstrained) coordinates of the varying
//! parameters, carrying an analytic Jacobian through the bounds transform when
//! the problem provides one.

use crate::error::{RamanError, Result};
use crate::parameters::Parameters;
use crate::problem::Problem;
use ndarray::{Array1, Array2, Axis};

/// A trait for problems that use the Parameters system
pub trait ParameterProblem {
    /// The starting parameters; their vary flags and bounds define the fit.
    fn parameters(&self) -> &Parameters;

    /// Get the number of residuals in the problem
    fn residual_count(&self) -> usize;

    /// Evaluate the residuals for a complete parameter set
    fn eval_with_parameters(&self, params: &Parameters) -> Result<Array1<f64>>;

    /// Jacobian of the residuals with respect to every parameter, columns in
    /// collection order. Only called when [`has_custom_jacobian`] is true.
    ///
    /// [`has_custom_jacobian`]: ParameterProblem::has_custom_jacobian
    fn jacobian_with_parameters(&self, params: &Parameters) -> Result<Array2<f64>> {
        let _ = params;
        Err(RamanError::FunctionEvaluation(
            "no analytic Jacobian available".to_string(),
        ))
    }

    /// Check if this problem provides an analytic Jacobian
    fn has_custom_jacobian(&self) -> bool {
        false
    }
}

/// An adapter that implements Problem for ParameterProblem implementations
pub struct ParameterProblemAdapter<'a, P: ParameterProblem + ?Sized> {
    problem: &'a P,
    /// Positions of the varying parameters within the collection
    varying_indices: Vec<usize>,
}

impl<'a, P: ParameterProblem + ?Sized> ParameterProblemAdapter<'a, P> {
    /// Create a new adapter for a ParameterProblem implementation
    pub fn new(problem: &'a P) -> Self {
        let varying_indices = problem
            .parameters()
            .iter()
            .enumerate()
            .filter(|(_, (_, p))| p.vary())
            .map(|(i, _)| i)
            .collect();

        Self {
            problem,
            varying_indices,
        }
    }

    /// Internal coordinates of the starting parameters
    pub fn initial_internal(&self) -> Result<Array1<f64>> {
        let values = self.problem.parameters().varying_internal_values()?;
        Ok(Array1::from_vec(values))
    }

    /// Full parameter set for the given internal coordinates
    pub fn parameters_from_internal(&self, internal: &Array1<f64>) -> Result<Parameters> {
        let mut parameters = self.problem.parameters().clone();
        parameters.update_from_internal(&internal.to_vec())?;
        Ok(parameters)
    }

    /// Jacobian with respect to the external values of the varying parameters.
    ///
    /// This is the Jacobian the covariance estimate needs.
    pub fn external_jacobian(&self, params: &Parameters) -> Result<Array2<f64>> {
        if self.problem.has_custom_jacobian() {
            let full = self.problem.jacobian_with_parameters(params)?;
            return Ok(full.select(Axis(1), &self.varying_indices));
        }

        let external = ExternalCoordinates {
            problem: self.problem,
            template: params,
        };
        let values = Array1::from_iter(params.varying().iter().map(|p| p.value()));
        crate::utils::finite_difference::jacobian(&external, &values, None)
    }
}

impl<'a, P: ParameterProblem + ?Sized> Problem for ParameterProblemAdapter<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let parameters = self.parameters_from_internal(params)?;
        self.problem.eval_with_parameters(&parameters)
    }

    fn parameter_count(&self) -> usize {
        self.varying_indices.len()
    }

    fn residual_count(&self) -> usize {
        self.problem.residual_count()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        if !self.problem.has_custom_jacobian() {
            return crate::utils::finite_difference::jacobian(self, params, None);
        }

        let parameters = self.parameters_from_internal(params)?;
        let mut jac = self.external_jacobian(&parameters)?;

        // Chain rule through the bounds transform
        let varying = parameters.varying();
        for (k, mut column) in jac.axis_iter_mut(Axis(1)).enumerate() {
            let scale = varying[k].bounds_transform().external_derivative(params[k]);
            column.mapv_inplace(|v| v * scale);
        }

        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        self.problem.has_custom_jacobian()
    }
}

/// The varying parameters in external coordinates, bounds ignored.
struct ExternalCoordinates<'a, P: ParameterProblem + ?Sized> {
    problem: &'a P,
    template: &'a Parameters,
}

impl<'a, P: ParameterProblem + ?Sized> Problem for ExternalCoordinates<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let mut parameters = self.template.clone();
        let varying = parameters.iter_mut().filter(|(_, p)| p.vary());
        for ((_, param), &value) in varying.zip(params.iter()) {
            // Finite-difference steps may leave the bounds by a hair
            param.set_bounds(f64::NEG_INFINITY, f64::INFINITY)?;
            param.set_value(value)?;
        }
        self.problem.eval_with_parameters(&parameters)
    }

    fn parameter_count(&self) -> usize {
        self.template.varying().len()
    }

    fn residual_count(&self) -> usize {
        self.problem.residual_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// y = a * x + b with `a` bounded to [0, 10]
    struct LinearModelWithParams {
        x: Array1<f64>,
        y: Array1<f64>,
        params: Parameters,
        analytic: bool,
    }

    impl LinearModelWithParams {
        fn new(analytic: bool) -> Self {
            let mut params = Parameters::new();
            params.add_param_with_bounds("a", 1.0, 0.0, 10.0).unwrap();
            params.add_param("b", 0.5).unwrap();
            Self {
                x: array![0.0, 1.0, 2.0, 3.0],
                y: array![1.0, 3.0, 5.0, 7.0],
                params,
                analytic,
            }
        }
    }

    impl ParameterProblem for LinearModelWithParams {
        fn parameters(&self) -> &Parameters {
            &self.params
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }

        fn eval_with_parameters(&self, params: &Parameters) -> Result<Array1<f64>> {
            let a = params.value("a")?;
            let b = params.value("b")?;
            Ok(&self.y - &(&self.x * a + b))
        }

        fn jacobian_with_parameters(&self, _params: &Parameters) -> Result<Array2<f64>> {
            let mut jac = Array2::zeros((self.x.len(), 2));
            jac.column_mut(0).assign(&self.x.mapv(|x| -x));
            jac.column_mut(1).fill(-1.0);
            Ok(jac)
        }

        fn has_custom_jacobian(&self) -> bool {
            self.analytic
        }
    }

    #[test]
    fn test_adapter_round_trips_parameters() {
        let problem = LinearModelWithParams::new(false);
        let adapter = ParameterProblemAdapter::new(&problem);

        assert_eq!(adapter.parameter_count(), 2);
        let internal = adapter.initial_internal().unwrap();
        let params = adapter.parameters_from_internal(&internal).unwrap();
        assert_relative_eq!(params.value("a").unwrap(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(params.value("b").unwrap(), 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_analytic_and_numeric_jacobians_agree() {
        let numeric = LinearModelWithParams::new(false);
        let analytic = LinearModelWithParams::new(true);
        let numeric_adapter = ParameterProblemAdapter::new(&numeric);
        let analytic_adapter = ParameterProblemAdapter::new(&analytic);

        let internal = numeric_adapter.initial_internal().unwrap();
        let jn = numeric_adapter.jacobian(&internal).unwrap();
        let ja = analytic_adapter.jacobian(&internal).unwrap();

        for (a, n) in ja.iter().zip(jn.iter()) {
            assert_relative_eq!(*a, *n, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_fixed_parameters_are_not_columns() {
        let mut problem = LinearModelWithParams::new(true);
        problem.params.get_mut("a").unwrap().set_vary(false);
        let adapter = ParameterProblemAdapter::new(&problem);

        assert_eq!(adapter.parameter_count(), 1);
        let jac = adapter.external_jacobian(problem.parameters()).unwrap();
        assert_eq!(jac.shape(), &[4, 1]);
        assert_eq!(jac[[0, 0]], -1.0);
    }
}
