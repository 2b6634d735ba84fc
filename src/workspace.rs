//! The processing session: bands, fit baseline, anchors and options, plus
//! routing of plot clicks to whichever gesture is active.

use std::path::PathBuf;

use log::{info, warn};

use crate::anchors::{AnchorOutcome, AnchorSet};
use crate::bands::{BandCollection, BandId};
use crate::baseline::BaselineParameters;
use crate::collector::PlotPoint;
use crate::config::ProcessingConfig;
use crate::error::{RamanError, Result};
use crate::fitting::{self, BatchSummary, FitSink, GuideFitProposal, Progress};
use crate::maps::MapStore;
use crate::report::import_report;

/// Which processing step plot clicks belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Clicks place baseline-subtraction anchors.
    Subtract,
    /// Clicks feed band or fit-baseline gestures.
    #[default]
    Fit,
}

/// What a plot click did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// No gesture was active.
    Ignored,
    Anchor(AnchorOutcome),
    /// A band gesture took the point and needs more.
    BandPoint,
    /// The band gesture completed for this band.
    BandCollected(String),
    /// The baseline gesture took the point and needs more.
    BaselinePoint,
    /// The baseline gesture completed.
    BaselineDefined,
}

/// Session state owned by one user.
#[derive(Debug, Clone)]
pub struct FitWorkspace {
    config: ProcessingConfig,
    stage: Stage,
    bands: BandCollection,
    baseline: BaselineParameters,
    anchors: AnchorSet,
    anchors_saved: bool,
    selected: Option<BandId>,
}

impl Default for FitWorkspace {
    fn default() -> Self {
        Self::new(ProcessingConfig::default())
    }
}

impl FitWorkspace {
    pub fn new(config: ProcessingConfig) -> Self {
        Self {
            config,
            stage: Stage::default(),
            bands: BandCollection::new(),
            baseline: BaselineParameters::new(),
            anchors: AnchorSet::new(),
            anchors_saved: true,
            selected: None,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProcessingConfig {
        &mut self.config
    }

    pub fn bands(&self) -> &BandCollection {
        &self.bands
    }

    pub fn bands_mut(&mut self) -> &mut BandCollection {
        &mut self.bands
    }

    pub fn baseline(&self) -> &BaselineParameters {
        &self.baseline
    }

    pub fn baseline_mut(&mut self) -> &mut BaselineParameters {
        &mut self.baseline
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Switch stage; any gesture in progress is dropped.
    pub fn set_stage(&mut self, stage: Stage) {
        self.bands.stop_collecting();
        self.baseline.stop_selecting();
        self.stage = stage;
    }

    /// Name of the selected band.
    pub fn selected_band(&self) -> Option<String> {
        self.selected.and_then(|id| self.bands.name_of(id))
    }

    pub fn select_band(&mut self, name: &str) -> Result<()> {
        self.selected = Some(self.bands.id_of(name)?);
        Ok(())
    }

    /// Append a band, selecting it when nothing is selected. Returns its name.
    pub fn add_band(&mut self) -> String {
        let name = BandCollection::name_for(self.bands.add_band());
        if self.selected_band().is_none() {
            self.selected = self.bands.id_of(&name).ok();
        }
        name
    }

    /// Delete the selected band and select `B0`, if any band remains.
    pub fn delete_selected_band(&mut self) -> Result<()> {
        let name = self.selected_band().ok_or(RamanError::NoBands)?;
        self.bands.delete_band(&name)?;
        self.selected = self.bands.id_of(&BandCollection::name_for(0)).ok();
        Ok(())
    }

    /// Start or stop the three-click gesture on the selected band; true when
    /// collection is now on. Baseline selection is switched off.
    pub fn toggle_band_collection(&mut self) -> Result<bool> {
        if self.bands.collecting() {
            self.bands.stop_collecting();
            return Ok(false);
        }
        let name = self.selected_band().ok_or(RamanError::NoBands)?;
        self.baseline.stop_selecting();
        self.bands.start_collecting(&name)?;
        Ok(true)
    }

    /// Start or stop the two-click baseline gesture; true when selection is
    /// now on. Band collection is switched off.
    pub fn toggle_baseline_selection(&mut self) -> bool {
        if self.baseline.selecting() {
            self.baseline.stop_selecting();
            return false;
        }
        self.bands.stop_collecting();
        self.baseline.start_selecting();
        true
    }

    /// Route a plot click.
    ///
    /// In the fit stage a completed band gesture moves the selection to the
    /// next band, unless the collected band is the last one.
    pub fn click(&mut self, point: PlotPoint) -> Result<ClickOutcome> {
        match self.stage {
            Stage::Subtract => {
                let outcome = self.anchors.add(point.x);
                if outcome == AnchorOutcome::Inserted {
                    self.anchors_saved = false;
                }
                Ok(ClickOutcome::Anchor(outcome))
            }
            Stage::Fit if self.bands.collecting() => match self.bands.add_reference(point)? {
                Some(index) => {
                    if index + 1 < self.bands.len() {
                        let next = BandCollection::name_for(index + 1);
                        self.selected = self.bands.id_of(&next).ok();
                    }
                    Ok(ClickOutcome::BandCollected(BandCollection::name_for(index)))
                }
                None => Ok(ClickOutcome::BandPoint),
            },
            Stage::Fit if self.baseline.selecting() => {
                if self.baseline.add_reference(point)? {
                    Ok(ClickOutcome::BaselineDefined)
                } else {
                    Ok(ClickOutcome::BaselinePoint)
                }
            }
            Stage::Fit => Ok(ClickOutcome::Ignored),
        }
    }

    /// Seed the anchors with the spectrum limits of the first open map.
    pub fn ensure_anchor_limits(&mut self, store: &mut MapStore) -> Result<()> {
        let orig = store.maps().first().ok_or(RamanError::NoMaps)?.orig.clone();
        let data = store.read(&orig)?;
        let before = self.anchors.len();
        self.anchors.ensure_limits(data.frequencies());
        if self.anchors.len() != before {
            self.anchors_saved = false;
        }
        Ok(())
    }

    pub fn delete_anchor(&mut self, value: f64) -> Result<()> {
        self.anchors.delete(value)?;
        self.anchors_saved = false;
        Ok(())
    }

    /// Add anchors listed in a `BaselineParameters.txt` file.
    pub fn import_anchors(&mut self, text: &str) -> Result<usize> {
        let inserted = self.anchors.import_parameter_text(text)?;
        if inserted > 0 {
            self.anchors_saved = false;
        }
        info!("Imported {} anchors", inserted);
        Ok(inserted)
    }

    /// Subtract the anchor baseline from every open map.
    pub fn subtract(
        &mut self,
        store: &mut MapStore,
        progress: impl FnMut(Progress),
    ) -> Result<()> {
        store.subtract_all(&self.anchors, self.config.box_half_width, progress)?;
        self.anchors_saved = true;
        Ok(())
    }

    /// Guide fit of the average spectrum of map `orig`.
    pub fn fit_guide(
        &self,
        store: &mut MapStore,
        orig: &str,
        visible: Option<(f64, f64)>,
    ) -> Result<GuideFitProposal> {
        if store.is_empty() {
            return Err(RamanError::NoMaps);
        }
        let average = store.average(orig)?;
        fitting::fit_guide(&self.bands, &self.baseline, &average, visible, &self.config.lm)
    }

    /// Store the report of a guide fit with every open map, then accept it.
    ///
    /// Bands and baseline are only touched once every report is written.
    /// The last band becomes the selected one.
    pub fn accept_guide(
        &mut self,
        proposal: GuideFitProposal,
        store: &MapStore,
    ) -> Result<Vec<PathBuf>> {
        proposal.check(&self.bands)?;
        let paths = fitting::save_guide_report(store.maps(), &proposal.report())?;
        proposal.accept(&mut self.bands, &mut self.baseline)?;
        self.selected = self
            .bands
            .len()
            .checked_sub(1)
            .and_then(|last| self.bands.id_of(&BandCollection::name_for(last)).ok());
        Ok(paths)
    }

    /// Fit every open map from the accepted guide fit.
    pub fn fit_maps<S: FitSink>(
        &mut self,
        store: &mut MapStore,
        sink: &mut S,
        progress: impl FnMut(Progress),
    ) -> Result<BatchSummary> {
        fitting::fit_maps(
            store,
            &mut self.bands,
            &mut self.baseline,
            &self.config,
            sink,
            progress,
        )
    }

    /// Load bands and baseline from a guide report.
    ///
    /// With collected bands present, `clear_all` decides whether they are
    /// replaced or kept alongside the imported ones.
    pub fn import_guide(&mut self, text: &str, clear_all: bool) -> Result<()> {
        let imported = import_report(text).map_err(|e| {
            warn!("Guide import rejected: {}", e);
            e
        })?;
        fitting::apply_imported_guide(&mut self.bands, &mut self.baseline, &imported, clear_all)?;
        if self.selected_band().is_none() {
            self.selected = self.bands.id_of(&BandCollection::name_for(0)).ok();
        }
        Ok(())
    }

    /// True when bands, baseline and anchors carry no unsaved change.
    pub fn check_changes(&self) -> bool {
        self.bands.check_changes() && self.baseline.check_changes() && self.anchors_saved
    }

    /// Forget bands, baseline, anchors and the selection; the options stay.
    pub fn reset(&mut self) {
        let config = std::mem::take(&mut self.config);
        *self = Self::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::BandField;

    fn point(x: f64, y: f64) -> PlotPoint {
        PlotPoint::new(x, y)
    }

    #[test]
    fn test_add_band_selects_first() {
        let mut ws = FitWorkspace::new(ProcessingConfig::default());
        assert_eq!(ws.add_band(), "B0");
        assert_eq!(ws.add_band(), "B1");
        assert_eq!(ws.selected_band().as_deref(), Some("B0"));
    }

    #[test]
    fn test_click_collects_band_and_advances() {
        let mut ws = FitWorkspace::new(ProcessingConfig::default());
        ws.add_band();
        ws.add_band();
        assert!(ws.toggle_band_collection().unwrap());

        assert_eq!(ws.click(point(100.0, 10.0)).unwrap(), ClickOutcome::BandPoint);
        assert_eq!(ws.click(point(95.0, 10.0)).unwrap(), ClickOutcome::BandPoint);
        assert_eq!(
            ws.click(point(100.0, 50.0)).unwrap(),
            ClickOutcome::BandCollected("B0".to_string())
        );
        assert_eq!(
            ws.bands().get("B0").unwrap().values(),
            Some((100.0, 5.0, 40.0))
        );
        assert_eq!(ws.selected_band().as_deref(), Some("B1"));
        assert_eq!(ws.click(point(1.0, 1.0)).unwrap(), ClickOutcome::Ignored);
    }

    #[test]
    fn test_toggles_are_exclusive() {
        let mut ws = FitWorkspace::new(ProcessingConfig::default());
        assert!(matches!(
            ws.toggle_band_collection(),
            Err(RamanError::NoBands)
        ));
        ws.add_band();
        ws.toggle_band_collection().unwrap();
        assert!(ws.toggle_baseline_selection());
        assert!(!ws.bands().collecting());

        ws.click(point(100.0, 50.0)).unwrap();
        assert_eq!(
            ws.click(point(200.0, 150.0)).unwrap(),
            ClickOutcome::BaselineDefined
        );
        assert_eq!(ws.baseline().slope(), Some(1.0));
        assert_eq!(ws.baseline().offset(), Some(-50.0));

        ws.toggle_band_collection().unwrap();
        assert!(!ws.baseline().selecting());
        assert!(!ws.toggle_band_collection().unwrap());
    }

    #[test]
    fn test_subtract_stage_places_anchors() {
        let mut ws = FitWorkspace::new(ProcessingConfig::default());
        ws.set_stage(Stage::Subtract);
        assert_eq!(
            ws.click(point(100.0, 0.0)).unwrap(),
            ClickOutcome::Anchor(AnchorOutcome::Inserted)
        );
        assert_eq!(
            ws.click(point(100.0, 5.0)).unwrap(),
            ClickOutcome::Anchor(AnchorOutcome::Ignored)
        );
        assert!(!ws.check_changes());
        assert_eq!(ws.anchors().as_slice(), &[100.0]);
    }

    #[test]
    fn test_delete_selected_band_reselects_first() {
        let mut ws = FitWorkspace::new(ProcessingConfig::default());
        ws.add_band();
        ws.add_band();
        ws.add_band();
        ws.select_band("B1").unwrap();
        ws.delete_selected_band().unwrap();
        assert_eq!(ws.bands().names(), vec!["B0", "B1"]);
        assert_eq!(ws.selected_band().as_deref(), Some("B0"));

        ws.delete_selected_band().unwrap();
        ws.delete_selected_band().unwrap();
        assert_eq!(ws.selected_band(), None);
        assert!(ws.delete_selected_band().is_err());
    }

    #[test]
    fn test_reset_keeps_config() {
        let config = ProcessingConfig::default().with_window(5.0);
        let mut ws = FitWorkspace::new(config.clone());
        ws.add_band();
        ws.bands_mut()
            .set_entry("B0", BandField::Position, "100")
            .unwrap();
        assert!(!ws.check_changes());

        ws.reset();
        assert!(ws.bands().is_empty());
        assert!(ws.check_changes());
        assert_eq!(ws.config(), &config);
    }
}
