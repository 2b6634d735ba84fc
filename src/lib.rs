//! # raman-map-rs
//!
//! Processing of Raman hyperspectral maps: every point of a map is a
//! spectrum, and a session takes a set of maps through
//!
//! - cutting to a frequency range and shifting the axes ([`maps`]),
//! - subtracting a piecewise-linear baseline through anchor points
//!   ([`anchors`]),
//! - fitting a linear baseline plus Lorentzian bands to the average spectrum
//!   (the guide fit), then to every point of every map ([`fitting`]),
//! - exporting fit spectra, lmfit-style reports and band intensity heatmaps
//!   ([`export`], [`report`]).
//!
//! Fits use a bounded Levenberg-Marquardt solver ([`lm`]) over named
//! parameters ([`parameters`]), with standard errors and correlations
//! estimated from the Jacobian at the solution.
//!
//! ## Basic Usage
//!
//! ```
//! use raman_map::{BandCollection, BandField, BaselineParameters, SpectralModel};
//! use raman_map::fitting::guide_parameters;
//! use ndarray::Array1;
//!
//! let mut bands = BandCollection::new();
//! bands.add_band();
//! bands.set_entry("B0", BandField::Position, "100").unwrap();
//! bands.set_entry("B0", BandField::Decay, "10").unwrap();
//! bands.set_entry("B0", BandField::Intensity, "40").unwrap();
//!
//! let spectral = guide_parameters(&bands, &BaselineParameters::new(), (50.0, 150.0)).unwrap();
//! let params = spectral.to_parameters().unwrap();
//! let frequencies = Array1::from(vec![100.0, 105.0]);
//! let y = SpectralModel::evaluate(&params, &frequencies).unwrap();
//! assert_eq!(y[0], 40.0);
//! assert_eq!(y[1], 20.0);
//! ```

pub mod error;

// Parameter system and solver
pub mod lm;
pub mod parameters;
pub mod problem;
pub mod problem_params;
pub mod uncertainty;
pub mod utils;

// Spectral model and fitting
pub mod minimizer;
pub mod model;
pub mod report;

// Session entities
pub mod anchors;
pub mod bands;
pub mod baseline;
pub mod collector;

// Maps, batch fitting and exports
pub mod config;
pub mod export;
pub mod fitting;
pub mod maps;
pub mod workspace;

// Re-exports for convenience
pub use anchors::{AnchorOutcome, AnchorSet};
pub use bands::{Band, BandCollection, BandField};
pub use baseline::BaselineParameters;
pub use collector::PlotPoint;
pub use config::{FitOptions, ProcessingConfig};
pub use error::{RamanError, Result};
pub use fitting::{BatchFitter, DirectorySink, FitSink, GuideFitProposal, Heatmap, Progress};
pub use lm::{LevenbergMarquardt, LmConfig};
pub use maps::{Map, MapData, MapStore, PointKey};
pub use minimizer::{minimize, MinimizerResult};
pub use model::SpectralModel;
pub use parameters::{Parameter, Parameters, SpectralParameters};
pub use problem::Problem;
pub use workspace::{ClickOutcome, FitWorkspace, Stage};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
