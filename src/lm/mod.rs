//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the bounded least-squares solver behind every spectral
//! fit. Problems implement [`crate::problem::Problem`]; named, bounded
//! parameters reach it through [`crate::problem_params::ParameterProblemAdapter`].

pub mod algorithm;
pub mod config;
pub mod convergence;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::{DiffMethod, LmConfig};
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
