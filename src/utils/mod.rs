//! Utility functions and helpers.

pub mod finite_difference;
pub mod matrix_convert;

pub use finite_difference::{jacobian, jacobian_central};
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// Round to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
