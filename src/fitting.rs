//! Guide fit of an average spectrum and batch fitting of whole maps.
//!
//! A session first fits the average spectrum of one map from the collected
//! bands ([`fit_guide`]). Once that guide fit is accepted, every point of
//! every map is fitted from the guide values ([`BatchFitter`]), producing a
//! fit spectrum and a report per point and a heatmap of band intensities per
//! map.

use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use log::{debug, info, warn};
use ndarray::Array1;

use crate::bands::{BandCollection, BandField};
use crate::baseline::BaselineParameters;
use crate::config::{FitOptions, ProcessingConfig};
use crate::error::{RamanError, Result};
use crate::export;
use crate::lm::LmConfig;
use crate::maps::{AverageSpectrum, Map, MapData, MapStore, PointKey};
use crate::minimizer::{minimize, MinimizerResult};
use crate::model::SpectralModel;
use crate::parameters::spectral::{band_count, decay_name, intensity_name, position_name};
use crate::parameters::spectral::{OFFSET, SLOPE};
use crate::parameters::{Bounds, ParamSpec, Parameters, PeakSpec, SpectralParameters};
use crate::report::{fit_report, ImportedGuide};
use crate::utils::round_to;

/// `done` of `total` steps of a long operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Completed share in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}

/// Curves of one fitted spectrum, all sampled at `frequencies`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSpectrum {
    pub frequencies: Array1<f64>,
    pub observed: Array1<f64>,
    pub total: Array1<f64>,
    pub baseline: Array1<f64>,
    /// Baseline plus each band alone, in band order.
    pub bands: Vec<Array1<f64>>,
}

impl FitSpectrum {
    pub fn new(
        params: &Parameters,
        frequencies: &Array1<f64>,
        observed: &Array1<f64>,
    ) -> Result<Self> {
        let bands = (0..band_count(params))
            .map(|i| SpectralModel::band_curve(params, i, frequencies))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            frequencies: frequencies.clone(),
            observed: observed.clone(),
            total: SpectralModel::evaluate(params, frequencies)?,
            baseline: SpectralModel::baseline(params, frequencies)?,
            bands,
        })
    }
}

/// Fitted band intensities per map point, rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    band_count: usize,
    rows: IndexMap<PointKey, Vec<f64>>,
}

impl Heatmap {
    pub fn new(band_count: usize) -> Self {
        Self {
            band_count,
            rows: IndexMap::new(),
        }
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn push(&mut self, key: PointKey, intensities: Vec<f64>) {
        let rounded = intensities.into_iter().map(|h| round_to(h, 2)).collect();
        self.rows.insert(key, rounded);
    }

    pub fn rows(&self) -> &IndexMap<PointKey, Vec<f64>> {
        &self.rows
    }

    pub fn get(&self, x: &str, y: &str) -> Option<&[f64]> {
        self.rows
            .get(&(x.to_string(), y.to_string()))
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Starting parameters for a guide fit.
///
/// Only collected bands take part, renumbered contiguously. Positions are
/// bounded to `visible` and clamped into it; decays and intensities are
/// bounded below by zero. Every fix flag holds its value.
pub fn guide_parameters(
    bands: &BandCollection,
    baseline: &BaselineParameters,
    visible: (f64, f64),
) -> Result<SpectralParameters> {
    if bands.useful_len() == 0 {
        return Err(RamanError::NoCollectedBands);
    }
    let window = Bounds::new(visible.0, visible.1)?;
    let (offset, slope) = baseline.values_or_zero();
    let mut spectral = SpectralParameters::new(
        ParamSpec::free(offset).with_vary(!baseline.fix_offset()),
        ParamSpec::free(slope).with_vary(!baseline.fix_slope()),
    );

    for band in bands.iter() {
        let Some((position, decay, intensity)) = band.values() else {
            continue;
        };
        spectral.push_peak(PeakSpec {
            position: ParamSpec::free(window.clamp(position))
                .with_bounds(window)
                .with_vary(!band.is_fixed(BandField::Position)),
            decay: ParamSpec::non_negative(decay)
                .with_vary(!band.is_fixed(BandField::Decay)),
            intensity: ParamSpec::non_negative(intensity)
                .with_vary(!band.is_fixed(BandField::Intensity)),
        });
    }
    Ok(spectral)
}

/// Starting parameters shared by every point of a map fit.
///
/// The baseline is held at the guide values. Positions and decays are
/// either held or allowed to move within `± window` (decays never below
/// zero); intensities vary, bounded below by zero.
pub fn map_parameters(
    bands: &BandCollection,
    baseline: &BaselineParameters,
    options: &FitOptions,
) -> Result<SpectralParameters> {
    if bands.is_empty() {
        return Err(RamanError::NoCollectedBands);
    }
    let (offset, slope) = baseline.values_or_zero();
    let mut spectral = SpectralParameters::new(ParamSpec::fixed(offset), ParamSpec::fixed(slope));

    for (name, band) in bands.names().iter().zip(bands.iter()) {
        let (position, decay, intensity) = band.values().ok_or_else(|| {
            RamanError::ParameterError(format!("band {} is not fully defined", name))
        })?;
        let w = options.window;
        let (position, decay) = if options.fix_position_and_decay {
            (ParamSpec::fixed(position), ParamSpec::fixed(decay))
        } else {
            (
                ParamSpec::free(position).with_bounds(Bounds::around(position, w)),
                ParamSpec::free(decay).with_bounds(Bounds::new((decay - w).max(0.0), decay + w)?),
            )
        };
        spectral.push_peak(PeakSpec {
            position,
            decay,
            intensity: ParamSpec::non_negative(intensity),
        });
    }
    Ok(spectral)
}

/// A guide fit waiting to be accepted or rejected.
///
/// Bands and baseline are left untouched until [`accept`](Self::accept).
#[derive(Debug, Clone)]
pub struct GuideFitProposal {
    /// Map whose average spectrum was fitted.
    pub orig: String,
    pub initial: Parameters,
    pub result: MinimizerResult,
    pub spectrum: FitSpectrum,
}

impl GuideFitProposal {
    pub fn fitted(&self) -> &Parameters {
        &self.result.params
    }

    pub fn report(&self) -> String {
        fit_report(&self.result)
    }

    /// Refused when the collected bands no longer match the fitted ones.
    pub fn check(&self, bands: &BandCollection) -> Result<()> {
        if bands.useful_len() != band_count(&self.result.params) {
            return Err(RamanError::StaleGuideFit);
        }
        Ok(())
    }

    /// Write the fitted values into the session and return the report.
    ///
    /// Uncollected bands are removed first, so the remaining bands line up
    /// with the fitted `x{i}`, `d{i}`, `h{i}`. Band values and the offset
    /// are rounded to 2 decimals, the slope to 3.
    pub fn accept(
        self,
        bands: &mut BandCollection,
        baseline: &mut BaselineParameters,
    ) -> Result<String> {
        self.check(bands)?;
        let params = &self.result.params;
        let fitted = band_count(params);
        let value = |name: &str| -> Result<f64> { Ok(params.value(name)?) };
        let offset = round_to(value(OFFSET)?, 2);
        let slope = round_to(value(SLOPE)?, 3);
        let mut shapes = Vec::with_capacity(fitted);
        for i in 0..fitted {
            shapes.push((
                round_to(value(&position_name(i))?, 2),
                round_to(value(&decay_name(i))?, 2),
                round_to(value(&intensity_name(i))?, 2),
            ));
        }

        bands.clear_empty_bands();
        for (i, (position, decay, intensity)) in shapes.into_iter().enumerate() {
            bands.apply_values(i, position, decay, intensity);
        }
        baseline.set_offset(Some(offset));
        baseline.set_slope(Some(slope));
        bands.guide_fitted();

        info!(
            "Accepted guide fit of {} with {} bands (chi-square {:.4})",
            self.orig, fitted, self.result.chisqr
        );
        Ok(self.report())
    }

    /// Drop the fit; the starting parameters are returned for display.
    pub fn reject(self) -> Parameters {
        info!("Rejected guide fit of {}", self.orig);
        self.initial
    }
}

/// Fit the average spectrum of one map from the collected bands.
///
/// `visible` bounds the band positions; without it the spectrum's own
/// frequency range is used.
pub fn fit_guide(
    bands: &BandCollection,
    baseline: &BaselineParameters,
    average: &AverageSpectrum,
    visible: Option<(f64, f64)>,
    lm: &LmConfig,
) -> Result<GuideFitProposal> {
    if average.frequencies.is_empty() {
        return Err(RamanError::NoData(format!("{} has an empty average", average.orig)));
    }
    let visible = visible.unwrap_or_else(|| {
        let f = &average.frequencies;
        (
            f.iter().copied().fold(f64::INFINITY, f64::min),
            f.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    });
    let initial = guide_parameters(bands, baseline, visible)?.to_parameters()?;
    let result = minimize(&initial, &average.intensities, &average.frequencies, lm)?;
    let spectrum = FitSpectrum::new(&result.params, &average.frequencies, &average.intensities)?;
    info!(
        "Guide fit of {}: {} bands, {} evaluations, chi-square {:.4}",
        average.orig,
        band_count(&initial),
        result.nfev,
        result.chisqr
    );
    Ok(GuideFitProposal {
        orig: average.orig.clone(),
        initial,
        result,
        spectrum,
    })
}

/// Store an accepted guide report as `Parameters/GuideFitParams.txt` of every
/// map.
pub fn save_guide_report(maps: &[Map], report: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(maps.len());
    for map in maps {
        let path = map.parameters_dir().join("GuideFitParams.txt");
        export::save_text(&path, report)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Replace bands and baseline with values read from a guide report.
///
/// When collected bands exist, `clear_all` removes every band; otherwise
/// only uncollected bands are removed. Imported bands are appended.
pub fn apply_imported_guide(
    bands: &mut BandCollection,
    baseline: &mut BaselineParameters,
    imported: &ImportedGuide,
    clear_all: bool,
) -> Result<()> {
    if imported.bands.iter().any(|&(_, decay, _)| decay == 0.0) {
        return Err(RamanError::ZeroWidthBand("imported band".to_string()));
    }
    if bands.useful_len() != 0 {
        if clear_all {
            bands.clear();
        } else {
            bands.clear_empty_bands();
        }
    }
    for &(position, decay, intensity) in &imported.bands {
        let index = bands.add_band();
        bands.apply_values(index, position, decay, intensity);
    }
    baseline.set_offset(Some(imported.offset));
    baseline.set_slope(Some(imported.slope));
    info!("Imported {} bands from a guide report", imported.bands.len());
    Ok(())
}

/// Result of fitting one map point.
#[derive(Debug, Clone)]
pub struct PointFit {
    pub key: PointKey,
    pub result: MinimizerResult,
    pub spectrum: FitSpectrum,
}

impl PointFit {
    /// Fitted `h{i}` of every band.
    pub fn intensities(&self) -> Result<Vec<f64>> {
        (0..band_count(&self.result.params))
            .map(|i| Ok(self.result.params.value(&intensity_name(i))?))
            .collect()
    }
}

/// Receives map fit results as they are produced.
pub trait FitSink {
    fn map_started(&mut self, _map: &Map) -> Result<()> {
        Ok(())
    }

    fn point_fitted(&mut self, map: &Map, fit: &PointFit) -> Result<()>;

    fn map_fitted(&mut self, map: &Map, heatmap: &Heatmap) -> Result<()>;
}

/// Keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl FitSink for DiscardSink {
    fn point_fitted(&mut self, _map: &Map, _fit: &PointFit) -> Result<()> {
        Ok(())
    }

    fn map_fitted(&mut self, _map: &Map, _heatmap: &Heatmap) -> Result<()> {
        Ok(())
    }
}

/// Writes fit spectra, reports and heatmaps under each map's `Fits`
/// directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySink;

impl FitSink for DirectorySink {
    fn map_started(&mut self, map: &Map) -> Result<()> {
        fs::create_dir_all(map.reports_dir())?;
        fs::create_dir_all(map.heatmaps_dir())?;
        Ok(())
    }

    fn point_fitted(&mut self, map: &Map, fit: &PointFit) -> Result<()> {
        let file = format!("{}.txt", export::point_file_stem(&map.name, &fit.key));
        export::save_fit_spectrum(map.fits_dir().join(&file), &fit.spectrum)?;
        export::save_text(map.reports_dir().join(&file), &fit_report(&fit.result))
    }

    fn map_fitted(&mut self, map: &Map, heatmap: &Heatmap) -> Result<()> {
        export::save_heatmap(
            map.heatmaps_dir().join(format!("{}_heatmaps.txt", map.name)),
            heatmap,
        )
    }
}

/// Totals of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub maps: usize,
    pub points: usize,
    /// Points whose fit stopped before converging.
    pub not_converged: usize,
    /// Heatmap per map, keyed by `orig`.
    pub heatmaps: IndexMap<String, Heatmap>,
}

/// Fits every point of every map from the accepted guide values.
#[derive(Debug, Clone)]
pub struct BatchFitter {
    params: Parameters,
    lm: LmConfig,
}

impl BatchFitter {
    /// Refused unless the bands match an accepted guide fit.
    pub fn new(
        bands: &BandCollection,
        baseline: &BaselineParameters,
        options: &FitOptions,
        lm: LmConfig,
    ) -> Result<Self> {
        if !bands.check_fitted() {
            return Err(RamanError::StaleGuideFit);
        }
        Ok(Self {
            params: map_parameters(bands, baseline, options)?.to_parameters()?,
            lm,
        })
    }

    /// Starting parameters of every point.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn fit_point(
        &self,
        key: &PointKey,
        frequencies: &Array1<f64>,
        observed: &Array1<f64>,
    ) -> Result<PointFit> {
        let result = minimize(&self.params, observed, frequencies, &self.lm)?;
        if !result.success {
            warn!("Fit of point ({}, {}) did not converge", key.0, key.1);
        }
        debug!(
            "Point ({}, {}): {} evaluations, chi-square {:.4}",
            key.0, key.1, result.nfev, result.chisqr
        );
        let spectrum = FitSpectrum::new(&result.params, frequencies, observed)?;
        Ok(PointFit {
            key: key.clone(),
            result,
            spectrum,
        })
    }

    /// Fit one map; `step` is called after every point.
    pub fn fit_map<S: FitSink>(
        &self,
        map: &Map,
        data: &MapData,
        sink: &mut S,
        mut step: impl FnMut(&PointFit),
    ) -> Result<Heatmap> {
        sink.map_started(map)?;
        let mut heatmap = Heatmap::new(band_count(&self.params));
        for (key, observed) in data.iter() {
            let fit = self.fit_point(key, data.frequencies(), observed)?;
            sink.point_fitted(map, &fit)?;
            heatmap.push(key.clone(), fit.intensities()?);
            step(&fit);
        }
        sink.map_fitted(map, &heatmap)?;
        Ok(heatmap)
    }

    /// Fit every open map.
    ///
    /// Progress counts one step per point plus one per map.
    pub fn fit_store<S: FitSink>(
        &self,
        store: &mut MapStore,
        sink: &mut S,
        mut progress: impl FnMut(Progress),
    ) -> Result<BatchSummary> {
        if store.is_empty() {
            return Err(RamanError::NoMaps);
        }
        let maps = store.maps().to_vec();
        let mut all = Vec::with_capacity(maps.len());
        for map in &maps {
            all.push(store.read(&map.orig)?);
        }

        let points: usize = all.iter().map(MapData::len).sum();
        let total = points + maps.len();
        let mut done = 0;
        let mut not_converged = 0;
        let mut heatmaps = IndexMap::with_capacity(maps.len());
        for (map, data) in maps.iter().zip(&all) {
            let heatmap = self.fit_map(map, data, sink, |fit| {
                if !fit.result.success {
                    not_converged += 1;
                }
                done += 1;
                progress(Progress::new(done, total));
            })?;
            done += 1;
            progress(Progress::new(done, total));
            info!("Fitted {} points of {}", heatmap.len(), map.name);
            heatmaps.insert(map.orig.clone(), heatmap);
        }

        Ok(BatchSummary {
            maps: maps.len(),
            points,
            not_converged,
            heatmaps,
        })
    }
}

/// Fit every open map and mark bands and baseline saved.
pub fn fit_maps<S: FitSink>(
    store: &mut MapStore,
    bands: &mut BandCollection,
    baseline: &mut BaselineParameters,
    config: &ProcessingConfig,
    sink: &mut S,
    progress: impl FnMut(Progress),
) -> Result<BatchSummary> {
    let fitter = BatchFitter::new(bands, baseline, &config.fit, config.lm.clone())?;
    let summary = fitter.fit_store(store, sink, progress)?;
    bands.save_changes();
    baseline.save_changes();
    info!(
        "Fitted {} maps, {} points ({} not converged)",
        summary.maps, summary.points, summary.not_converged
    );
    Ok(summary)
}
