//! # Parameter System
//!
//! Named fit parameters in the manner of lmfit-py, plus the structured record
//! of the spectral model.
//!
//! ## Core Components
//!
//! - [`Parameter`]: a value with a vary flag, bounds and (after a fit) a standard error
//! - [`Parameters`]: an insertion-ordered collection keyed by name
//! - [`Bounds`] and [`BoundsTransform`]: bounds and the Minuit transform used by the minimizer
//! - [`SpectralParameters`]: `{offset, slope, peaks}`, flattened to `Parameters` for fitting
//!
//! ## Example Usage
//!
//! ```rust
//! use raman_map::parameters::{Bounds, ParamSpec, PeakSpec, SpectralParameters};
//!
//! let mut spectral = SpectralParameters::new(ParamSpec::free(0.0), ParamSpec::free(0.0));
//! spectral.push_peak(PeakSpec {
//!     position: ParamSpec::free(520.0).with_bounds(Bounds::around(520.0, 3.0)),
//!     decay: ParamSpec::non_negative(4.0),
//!     intensity: ParamSpec::non_negative(100.0),
//! });
//!
//! let params = spectral.to_parameters().unwrap();
//! assert_eq!(params.names(), vec!["offset", "slope", "x0", "d0", "h0"]);
//! ```

pub mod bounds;
pub mod parameter;
pub mod parameters;
pub mod spectral;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use parameter::{Parameter, ParameterError};
pub use parameters::Parameters;
pub use spectral::{band_count, ParamSpec, PeakSpec, SpectralParameters};
