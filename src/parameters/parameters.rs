//! Name-keyed, insertion-ordered parameter collection.
//!
//! Order matters: the minimizer packs the varying parameters into its
//! internal vector in collection order, and the fit report lists them the
//! same way.

use crate::parameters::parameter::{Parameter, ParameterError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

type ParamResult<T> = std::result::Result<T, ParameterError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameters {
    params: IndexMap<String, Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `param`; names are unique.
    pub fn add(&mut self, param: Parameter) -> ParamResult<()> {
        if self.params.contains_key(param.name()) {
            return Err(ParameterError::DuplicateName {
                name: param.name().to_string(),
            });
        }
        self.params.insert(param.name().to_string(), param);
        Ok(())
    }

    /// ```
    /// use raman_map::parameters::parameters::Parameters;
    ///
    /// let mut params = Parameters::new();
    /// params.add_param("offset", 10.0).unwrap();
    /// params.add_param("slope", 0.01).unwrap();
    /// assert_eq!(params.names(), vec!["offset", "slope"]);
    /// ```
    pub fn add_param(&mut self, name: &str, value: f64) -> ParamResult<()> {
        self.add(Parameter::new(name, value))
    }

    pub fn add_param_with_bounds(
        &mut self,
        name: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> ParamResult<()> {
        self.add(Parameter::with_bounds(name, value, min, max)?)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.get_mut(name)
    }

    pub fn value(&self, name: &str) -> ParamResult<f64> {
        self.params
            .get(name)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Parameter)> {
        self.params.iter_mut()
    }

    pub fn varying(&self) -> Vec<&Parameter> {
        self.params.values().filter(|p| p.vary()).collect()
    }

    pub fn varying_names(&self) -> Vec<String> {
        self.varying().iter().map(|p| p.name().to_string()).collect()
    }

    /// Bound-transformed values of the varying parameters.
    pub fn varying_internal_values(&self) -> ParamResult<Vec<f64>> {
        self.varying().into_iter().map(Parameter::to_internal).collect()
    }

    /// Write internal values back into the varying parameters.
    ///
    /// Nothing changes when the count is wrong.
    pub fn update_from_internal(&mut self, values: &[f64]) -> ParamResult<()> {
        let expected = self.varying().len();
        if values.len() != expected {
            return Err(ParameterError::WrongValueCount {
                expected,
                actual: values.len(),
            });
        }

        let varying = self.params.values_mut().filter(|p| p.vary());
        for (param, &internal) in varying.zip(values) {
            // The transform can land a rounding error outside a finite bound.
            let external = param.bounds().clamp(param.from_internal(internal));
            param.set_value(external)?;
        }
        Ok(())
    }
}
