//! The linear baseline under the fitted bands.

use serde::{Deserialize, Serialize};

use crate::bands::parse_entry;
use crate::collector::{Gesture, PlotPoint, ReferencePointCollector};
use crate::error::{RamanError, Result};
use crate::utils::round_to;

/// Slope and offset derived from two clicks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedBaseline {
    pub slope: f64,
    pub offset: f64,
}

/// Two points on the baseline at different frequencies.
#[derive(Debug, Clone, Copy)]
pub struct BaselineGesture;

impl Gesture for BaselineGesture {
    const POINTS: usize = 2;
    type Output = DerivedBaseline;

    fn check(collected: &[PlotPoint], point: PlotPoint) -> Result<()> {
        match collected {
            [first] if first.x == point.x => Err(RamanError::CoincidentReference(point.x)),
            _ => Ok(()),
        }
    }

    fn derive(points: &[PlotPoint]) -> DerivedBaseline {
        let (a, b) = (points[0], points[1]);
        let slope = round_to((a.y - b.y) / (a.x - b.x), 3);
        DerivedBaseline {
            slope,
            offset: round_to(a.y - slope * a.x, 2),
        }
    }
}

/// Slope and offset of the fit baseline, with their fix flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineParameters {
    slope: Option<f64>,
    offset: Option<f64>,
    fix_slope: bool,
    fix_offset: bool,
    all_changes_saved: bool,
    #[serde(skip)]
    collector: ReferencePointCollector<BaselineGesture>,
}

impl Default for BaselineParameters {
    fn default() -> Self {
        Self {
            slope: None,
            offset: None,
            fix_slope: false,
            fix_offset: false,
            all_changes_saved: true,
            collector: ReferencePointCollector::new(),
        }
    }
}

impl BaselineParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slope(&self) -> Option<f64> {
        self.slope
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    /// `(offset, slope)` with unset values read as zero.
    pub fn values_or_zero(&self) -> (f64, f64) {
        (self.offset.unwrap_or(0.0), self.slope.unwrap_or(0.0))
    }

    pub fn fix_slope(&self) -> bool {
        self.fix_slope
    }

    pub fn fix_offset(&self) -> bool {
        self.fix_offset
    }

    pub fn set_fix_slope(&mut self, fixed: bool) {
        self.fix_slope = fixed;
    }

    pub fn set_fix_offset(&mut self, fixed: bool) {
        self.fix_offset = fixed;
    }

    pub fn set_slope(&mut self, slope: Option<f64>) {
        self.slope = slope;
        self.all_changes_saved = false;
    }

    pub fn set_offset(&mut self, offset: Option<f64>) {
        self.offset = offset;
        self.all_changes_saved = false;
    }

    /// Set the slope from its text entry; a leading minus is allowed.
    pub fn set_slope_entry(&mut self, text: &str) -> Result<()> {
        let slope = parse_entry("baseline slope", text, true)?;
        self.set_slope(slope);
        Ok(())
    }

    /// Set the offset from its text entry; a leading minus is allowed.
    pub fn set_offset_entry(&mut self, text: &str) -> Result<()> {
        let offset = parse_entry("baseline offset", text, true)?;
        self.set_offset(offset);
        Ok(())
    }

    /// Whether clicks currently go to the baseline gesture.
    pub fn selecting(&self) -> bool {
        self.collector.is_collecting()
    }

    pub fn reference_points(&self) -> &[PlotPoint] {
        self.collector.points()
    }

    pub fn start_selecting(&mut self) {
        self.collector.start();
    }

    pub fn stop_selecting(&mut self) {
        self.collector.cancel();
    }

    /// Feed one click; true once both points are in and the values are set.
    pub fn add_reference(&mut self, point: PlotPoint) -> Result<bool> {
        match self.collector.push(point)? {
            Some(derived) => {
                self.set_slope(Some(derived.slope));
                self.set_offset(Some(derived.offset));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reset values, flags, selection and the partial gesture.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn check_changes(&self) -> bool {
        self.all_changes_saved
    }

    pub fn save_changes(&mut self) {
        self.all_changes_saved = true;
    }
}
