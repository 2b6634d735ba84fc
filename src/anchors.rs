//! Anchor points for piecewise-linear baseline subtraction.
//!
//! The intensity at each anchor is a box average around the closest sample,
//! and the baseline is the linear interpolation through those values, held
//! constant beyond the first and last anchors.

use log::debug;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{RamanError, Result};

const HEADER: &str = "Linear interpolation between anchor points.";
const ANCHOR_PREFIX: &str = "Anchor points (cm-1):";

/// What [`AnchorSet::add`] did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOutcome {
    Inserted,
    /// Duplicate, or outside the current limits.
    Ignored,
}

/// A baseline subtraction of one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtraction {
    /// Intensities minus the baseline.
    pub subtracted: Array1<f64>,
    /// The interpolated baseline at every frequency.
    pub baseline: Array1<f64>,
    /// Box-averaged intensity at each anchor, in anchor order.
    pub anchor_intensities: Vec<f64>,
}

/// Sorted, distinct anchor frequencies.
///
/// Once two anchors exist the first and last bound the set: values outside
/// them are ignored and the bounds themselves cannot be deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    anchors: Vec<f64>,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.anchors
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.anchors.iter()
    }

    pub fn min(&self) -> Option<f64> {
        self.anchors.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.anchors.last().copied()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.anchors.contains(&value)
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    /// Insert `value` in order unless it is already present or, with two or
    /// more anchors, outside `[min, max]`.
    pub fn add(&mut self, value: f64) -> AnchorOutcome {
        if !value.is_finite() || self.contains(value) {
            return AnchorOutcome::Ignored;
        }
        if let (true, Some(min), Some(max)) = (self.len() >= 2, self.min(), self.max()) {
            if value < min || value > max {
                debug!("Anchor {} outside limits [{}, {}]", value, min, max);
                return AnchorOutcome::Ignored;
            }
        }

        let index = self.anchors.partition_point(|&a| a < value);
        self.anchors.insert(index, value);
        AnchorOutcome::Inserted
    }

    /// On an empty set, insert the first and last frequency as the limits.
    pub fn ensure_limits(&mut self, frequencies: &Array1<f64>) {
        if !self.is_empty() || frequencies.is_empty() {
            return;
        }
        let min = frequencies.iter().copied().fold(f64::INFINITY, f64::min);
        let max = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.add(min);
        self.add(max);
    }

    /// Remove an interior anchor.
    pub fn delete(&mut self, value: f64) -> Result<()> {
        let index = self
            .anchors
            .iter()
            .position(|&a| a == value)
            .ok_or(RamanError::AnchorNotFound(value))?;
        if index == 0 || index == self.anchors.len() - 1 {
            return Err(RamanError::ProtectedAnchor(value));
        }
        self.anchors.remove(index);
        Ok(())
    }

    /// Box-averaged intensity at every anchor.
    pub fn anchor_intensities(
        &self,
        frequencies: &Array1<f64>,
        intensities: &Array1<f64>,
        half_width: usize,
    ) -> Result<Vec<f64>> {
        check_spectrum(frequencies, intensities)?;
        Ok(self
            .anchors
            .iter()
            .map(|&anchor| {
                let index = find_closest(anchor, frequencies.view());
                box_average(intensities.view(), index, half_width)
            })
            .collect())
    }

    /// The interpolated baseline at every frequency.
    pub fn baseline(
        &self,
        frequencies: &Array1<f64>,
        intensities: &Array1<f64>,
        half_width: usize,
    ) -> Result<Array1<f64>> {
        Ok(self.subtract(frequencies, intensities, half_width)?.baseline)
    }

    /// Subtract the anchor baseline from one spectrum.
    pub fn subtract(
        &self,
        frequencies: &Array1<f64>,
        intensities: &Array1<f64>,
        half_width: usize,
    ) -> Result<Subtraction> {
        if self.anchors.len() < 2 {
            return Err(RamanError::TooFewAnchors(self.anchors.len()));
        }
        let anchor_intensities = self.anchor_intensities(frequencies, intensities, half_width)?;
        let baseline = frequencies.mapv(|f| interpolate(f, &self.anchors, &anchor_intensities));
        Ok(Subtraction {
            subtracted: intensities - &baseline,
            baseline,
            anchor_intensities,
        })
    }

    /// The anchor parameter file.
    pub fn to_parameter_text(&self, half_width: usize) -> String {
        let mut text = format!(
            "{}\nIntensity value for each anchor is an average intensity of box = {}.\n\n{}",
            HEADER, half_width, ANCHOR_PREFIX
        );
        for anchor in &self.anchors {
            text.push_str(&format!(" {:.2}", anchor));
        }
        text
    }

    /// Add every anchor listed in an anchor parameter file.
    ///
    /// The whole file is parsed before any anchor is added. Returns how many
    /// anchors were inserted.
    pub fn import_parameter_text(&mut self, text: &str) -> Result<usize> {
        let mut lines = text.lines();
        if !lines.next().is_some_and(|line| line.contains(HEADER)) {
            return Err(RamanError::ImportFormat(
                "file must be the result of a baseline subtraction".to_string(),
            ));
        }

        let mut values = Vec::new();
        for line in lines.filter_map(|line| line.trim().strip_prefix(ANCHOR_PREFIX)) {
            for token in line.split_whitespace() {
                let value = token.parse::<f64>().map_err(|_| {
                    RamanError::ImportFormat(format!("'{}' is not an anchor frequency", token))
                })?;
                values.push(value);
            }
        }

        Ok(values
            .into_iter()
            .filter(|&v| self.add(v) == AnchorOutcome::Inserted)
            .count())
    }
}

fn check_spectrum(frequencies: &Array1<f64>, intensities: &Array1<f64>) -> Result<()> {
    if frequencies.is_empty() {
        return Err(RamanError::NoData("empty spectrum".to_string()));
    }
    if frequencies.len() != intensities.len() {
        return Err(RamanError::DimensionMismatch(format!(
            "{} intensities for {} frequencies",
            intensities.len(),
            frequencies.len()
        )));
    }
    Ok(())
}

/// Mean of `values` over `index ± r`, where `r` is `half_width` shrunk until
/// the window fits inside the array on both sides. NaN for no values.
pub fn box_average(values: ArrayView1<f64>, index: usize, half_width: usize) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let last = values.len().saturating_sub(1);
    let index = index.min(last);
    let r = half_width.min(index).min(last - index);
    let window = values.slice(ndarray::s![index - r..=index + r]);
    window.sum() / window.len() as f64
}

/// Index of the sample nearest to `value`; the first one on ties.
pub fn find_closest(value: f64, samples: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, &sample) in samples.iter().enumerate() {
        let distance = (value - sample).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Linear interpolation through `(xp, fp)`, `xp` ascending, clamped to the
/// end values outside `[xp[0], xp[n-1]]`.
fn interpolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let upper = xp.partition_point(|&v| v <= x);
    let lower = upper - 1;
    let t = (x - xp[lower]) / (xp[upper] - xp[lower]);
    fp[lower] + t * (fp[upper] - fp[lower])
}
