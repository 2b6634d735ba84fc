//! Lorentzian band candidates and their ordered registry.
//!
//! Bands are stored by a stable [`BandId`]; the display name `B{i}` is
//! derived from the band's current position in the collection, so deleting
//! a band renumbers the survivors without touching their state.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::collector::{Gesture, PlotPoint, ReferencePointCollector};
use crate::error::{RamanError, Result};
use crate::utils::round_to;

/// Stable identity of a band, independent of its display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BandId(u64);

/// The three editable values of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandField {
    Position,
    Decay,
    Intensity,
}

impl BandField {
    pub const ALL: [BandField; 3] = [BandField::Position, BandField::Decay, BandField::Intensity];

    pub fn label(&self) -> &'static str {
        match self {
            BandField::Position => "position",
            BandField::Decay => "decay",
            BandField::Intensity => "intensity",
        }
    }
}

/// Parse a numeric text entry.
///
/// The empty string clears the field. Otherwise only digits with at most
/// one decimal point are accepted (`5`, `5.2`, `5.` and `.5`), with a leading
/// `-` when `allow_negative`.
pub fn parse_entry(field: &str, text: &str, allow_negative: bool) -> Result<Option<f64>> {
    if text.is_empty() {
        return Ok(None);
    }

    let invalid = || RamanError::InvalidEntry {
        field: field.to_string(),
        text: text.to_string(),
    };

    let unsigned = match text.strip_prefix('-') {
        Some(rest) if allow_negative => rest,
        Some(_) => return Err(invalid()),
        None => text,
    };

    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let valid = all_digits(whole) && all_digits(fraction) && whole.len() + fraction.len() > 0;
    if !valid {
        return Err(invalid());
    }

    text.parse::<f64>().map(Some).map_err(|_| invalid())
}

/// One Lorentzian peak candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    position: Option<f64>,
    decay: Option<f64>,
    intensity: Option<f64>,
    fix_position: bool,
    fix_decay: bool,
    fix_intensity: bool,
    unchanged_from_last_fit: bool,
    all_changes_saved: bool,
}

impl Default for Band {
    fn default() -> Self {
        Self {
            position: None,
            decay: None,
            intensity: None,
            fix_position: false,
            fix_decay: false,
            fix_intensity: false,
            unchanged_from_last_fit: true,
            all_changes_saved: true,
        }
    }
}

impl Band {
    pub fn position(&self) -> Option<f64> {
        self.position
    }

    pub fn decay(&self) -> Option<f64> {
        self.decay
    }

    pub fn intensity(&self) -> Option<f64> {
        self.intensity
    }

    pub fn value(&self, field: BandField) -> Option<f64> {
        match field {
            BandField::Position => self.position,
            BandField::Decay => self.decay,
            BandField::Intensity => self.intensity,
        }
    }

    pub fn is_fixed(&self, field: BandField) -> bool {
        match field {
            BandField::Position => self.fix_position,
            BandField::Decay => self.fix_decay,
            BandField::Intensity => self.fix_intensity,
        }
    }

    /// All three values are set.
    pub fn collected(&self) -> bool {
        self.position.is_some() && self.decay.is_some() && self.intensity.is_some()
    }

    pub fn unchanged_from_last_fit(&self) -> bool {
        self.unchanged_from_last_fit
    }

    pub fn all_changes_saved(&self) -> bool {
        self.all_changes_saved
    }

    /// `(position, decay, intensity)` when collected.
    pub fn values(&self) -> Option<(f64, f64, f64)> {
        Some((self.position?, self.decay?, self.intensity?))
    }

    fn set_value(&mut self, field: BandField, value: Option<f64>) {
        match field {
            BandField::Position => self.position = value,
            BandField::Decay => self.decay = value,
            BandField::Intensity => self.intensity = value,
        }
        if self.unchanged_from_last_fit {
            self.unchanged_from_last_fit = false;
            self.all_changes_saved = false;
        }
    }

    fn set_fixed(&mut self, field: BandField, fixed: bool) {
        match field {
            BandField::Position => self.fix_position = fixed,
            BandField::Decay => self.fix_decay = fixed,
            BandField::Intensity => self.fix_intensity = fixed,
        }
    }
}

/// Values derived from a three-click band gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedBand {
    pub position: f64,
    pub decay: f64,
    pub intensity: f64,
}

/// Centre, half-maximum point, then baseline point under the peak.
#[derive(Debug, Clone, Copy)]
pub struct BandGesture;

impl Gesture for BandGesture {
    const POINTS: usize = 3;
    type Output = DerivedBand;

    fn check(collected: &[PlotPoint], point: PlotPoint) -> Result<()> {
        match collected {
            [center] if round_to((center.x - point.x).abs(), 2) == 0.0 => {
                Err(RamanError::CoincidentReference(point.x))
            }
            _ => Ok(()),
        }
    }

    fn derive(points: &[PlotPoint]) -> DerivedBand {
        DerivedBand {
            position: round_to(points[0].x, 2),
            decay: round_to((points[0].x - points[1].x).abs(), 2),
            intensity: round_to((points[2].y - points[0].y).abs(), 2),
        }
    }
}

/// Ordered registry of bands plus the band-collection mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandCollection {
    bands: IndexMap<BandId, Band>,
    next_id: u64,
    #[serde(skip)]
    collector: ReferencePointCollector<BandGesture>,
    #[serde(skip)]
    target: Option<BandId>,
}

impl BandCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for the band at `index`.
    pub fn name_for(index: usize) -> String {
        format!("B{}", index)
    }

    /// Append a new empty band; returns its index.
    pub fn add_band(&mut self) -> usize {
        let id = BandId(self.next_id);
        self.next_id += 1;
        self.bands.insert(id, Band::default());
        self.bands.len() - 1
    }

    /// Number of bands, collected or not.
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Number of collected bands.
    pub fn useful_len(&self) -> usize {
        self.bands.values().filter(|b| b.collected()).count()
    }

    /// Names `B0..B(n-1)` in order.
    pub fn names(&self) -> Vec<String> {
        (0..self.bands.len()).map(Self::name_for).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.values()
    }

    /// Index of the band called `name`.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        name.strip_prefix('B')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&i| i < self.bands.len() && name == Self::name_for(i))
            .ok_or_else(|| RamanError::BandNotFound(name.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Result<BandId> {
        let index = self.index_of(name)?;
        self.bands
            .get_index(index)
            .map(|(id, _)| *id)
            .ok_or_else(|| RamanError::BandNotFound(name.to_string()))
    }

    /// Current name of a band, `None` once it has been deleted.
    pub fn name_of(&self, id: BandId) -> Option<String> {
        self.bands.get_index_of(&id).map(Self::name_for)
    }

    pub fn get(&self, name: &str) -> Result<&Band> {
        let index = self.index_of(name)?;
        self.bands
            .get_index(index)
            .map(|(_, band)| band)
            .ok_or_else(|| RamanError::BandNotFound(name.to_string()))
    }

    pub fn get_by_id(&self, id: BandId) -> Option<&Band> {
        self.bands.get(&id)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Band> {
        let index = self.index_of(name)?;
        self.bands
            .get_index_mut(index)
            .map(|(_, band)| band)
            .ok_or_else(|| RamanError::BandNotFound(name.to_string()))
    }

    /// Set a field from its text entry.
    pub fn set_entry(&mut self, name: &str, field: BandField, text: &str) -> Result<()> {
        let label = format!("{} {}", name, field.label());
        let value = parse_entry(&label, text, false)?;
        self.set_value(name, field, value)
    }

    /// Set or clear a field. A decay of exactly zero is refused.
    pub fn set_value(&mut self, name: &str, field: BandField, value: Option<f64>) -> Result<()> {
        if field == BandField::Decay && value == Some(0.0) {
            return Err(RamanError::ZeroWidthBand(name.to_string()));
        }
        self.get_mut(name)?.set_value(field, value);
        Ok(())
    }

    pub fn set_fixed(&mut self, name: &str, field: BandField, fixed: bool) -> Result<()> {
        self.get_mut(name)?.set_fixed(field, fixed);
        Ok(())
    }

    /// Write fitted values into the band at `index`.
    pub(crate) fn apply_values(&mut self, index: usize, position: f64, decay: f64, intensity: f64) {
        if let Some((_, band)) = self.bands.get_index_mut(index) {
            band.set_value(BandField::Position, Some(position));
            band.set_value(BandField::Decay, Some(decay));
            band.set_value(BandField::Intensity, Some(intensity));
        }
    }

    /// Remove a band; the survivors are renumbered in order.
    pub fn delete_band(&mut self, name: &str) -> Result<()> {
        let id = self.id_of(name)?;
        self.bands.shift_remove(&id);
        if self.target == Some(id) {
            self.stop_collecting();
        }
        Ok(())
    }

    /// Remove every band and leave collection mode.
    pub fn clear(&mut self) {
        self.bands.clear();
        self.stop_collecting();
    }

    /// Remove every band that is not fully defined.
    pub fn clear_empty_bands(&mut self) {
        self.bands.retain(|_, band| band.collected());
        self.stop_collecting();
    }

    pub fn collecting(&self) -> bool {
        self.collector.is_collecting()
    }

    /// Points gathered so far for the band being collected.
    pub fn reference_points(&self) -> &[PlotPoint] {
        self.collector.points()
    }

    /// Name of the band receiving clicks.
    pub fn collection_target(&self) -> Option<String> {
        self.target.and_then(|id| self.name_of(id))
    }

    /// Start a three-click gesture for the band called `name`.
    pub fn start_collecting(&mut self, name: &str) -> Result<()> {
        if self.bands.is_empty() {
            return Err(RamanError::NoBands);
        }
        let id = self.id_of(name)?;
        self.target = Some(id);
        self.collector.start();
        Ok(())
    }

    /// Leave collection mode, dropping any partial gesture.
    pub fn stop_collecting(&mut self) {
        self.collector.cancel();
        self.target = None;
    }

    /// Feed one click to the gesture.
    ///
    /// Returns the index of the band whose values were just derived when the
    /// click completes the gesture. Collection mode then ends.
    pub fn add_reference(&mut self, point: PlotPoint) -> Result<Option<usize>> {
        let Some(id) = self.target else {
            return Ok(None);
        };
        let Some(index) = self.bands.get_index_of(&id) else {
            self.stop_collecting();
            return Ok(None);
        };

        let Some(derived) = self.collector.push(point)? else {
            return Ok(None);
        };
        self.target = None;
        self.apply_values(index, derived.position, derived.decay, derived.intensity);
        Ok(Some(index))
    }

    /// Mark every band as matching the accepted guide fit.
    pub fn guide_fitted(&mut self) {
        for band in self.bands.values_mut() {
            band.unchanged_from_last_fit = true;
        }
    }

    /// True when bands exist and none changed since the last guide fit.
    pub fn check_fitted(&self) -> bool {
        !self.bands.is_empty() && self.bands.values().all(|b| b.unchanged_from_last_fit)
    }

    /// True when every change has been saved.
    pub fn check_changes(&self) -> bool {
        self.bands.values().all(|b| b.all_changes_saved)
    }

    pub fn save_changes(&mut self) {
        for band in self.bands.values_mut() {
            band.all_changes_saved = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected(bands: &mut BandCollection, x: f64, d: f64, h: f64) -> usize {
        let index = bands.add_band();
        let name = BandCollection::name_for(index);
        bands.set_value(&name, BandField::Position, Some(x)).unwrap();
        bands.set_value(&name, BandField::Decay, Some(d)).unwrap();
        bands.set_value(&name, BandField::Intensity, Some(h)).unwrap();
        index
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("f", "", false).unwrap(), None);
        assert_eq!(parse_entry("f", "12", false).unwrap(), Some(12.0));
        assert_eq!(parse_entry("f", "12.50", false).unwrap(), Some(12.5));
        assert_eq!(parse_entry("f", "-3.5", true).unwrap(), Some(-3.5));

        // Partial input while typing 5.2 or .5
        assert_eq!(parse_entry("f", "5.", false).unwrap(), Some(5.0));
        assert_eq!(parse_entry("f", ".5", false).unwrap(), Some(0.5));
        assert_eq!(parse_entry("f", "-.5", true).unwrap(), Some(-0.5));

        for bad in ["abc", "1.2.3", "-3", ".", "..5", "1e3", " 1", "+1"] {
            assert!(parse_entry("f", bad, false).is_err(), "{} accepted", bad);
        }
        assert!(parse_entry("f", "-", true).is_err());
        assert!(parse_entry("f", "-.", true).is_err());
    }

    #[test]
    fn test_band_names_must_be_canonical() {
        let mut bands = BandCollection::new();
        bands.add_band();
        bands.add_band();
        assert_eq!(bands.index_of("B1").unwrap(), 1);
        for name in ["B01", "B+1", "B 1", "B2", "b1", "B"] {
            assert!(
                matches!(bands.index_of(name), Err(RamanError::BandNotFound(_))),
                "{} resolved",
                name
            );
        }
        assert!(bands.get("B01").is_err());
    }

    #[test]
    fn test_new_band_state() {
        let mut bands = BandCollection::new();
        assert_eq!(bands.add_band(), 0);
        let band = bands.get("B0").unwrap();
        assert!(!band.collected());
        assert!(band.unchanged_from_last_fit());
        assert!(band.all_changes_saved());
    }

    #[test]
    fn test_edit_marks_dirty_once() {
        let mut bands = BandCollection::new();
        collected(&mut bands, 100.0, 5.0, 40.0);
        let band = bands.get("B0").unwrap();
        assert!(band.collected());
        assert!(!band.unchanged_from_last_fit());
        assert!(!band.all_changes_saved());

        bands.guide_fitted();
        assert!(bands.check_fitted());
        assert!(!bands.check_changes());

        bands.set_entry("B0", BandField::Intensity, "41").unwrap();
        assert!(!bands.check_fitted());

        bands.save_changes();
        assert!(bands.check_changes());
        // Still dirty for the fit, so a further edit does not re-dirty saving
        bands.set_entry("B0", BandField::Intensity, "42").unwrap();
        assert!(bands.check_changes());
    }

    #[test]
    fn test_invalid_entry_leaves_band_unchanged() {
        let mut bands = BandCollection::new();
        collected(&mut bands, 100.0, 5.0, 40.0);
        let before = bands.get("B0").unwrap().clone();

        assert!(bands.set_entry("B0", BandField::Position, "1O0").is_err());
        assert!(matches!(
            bands.set_entry("B0", BandField::Decay, "0"),
            Err(RamanError::ZeroWidthBand(_))
        ));
        assert_eq!(bands.get("B0").unwrap(), &before);
    }

    #[test]
    fn test_delete_renumbers_and_keeps_state() {
        let mut bands = BandCollection::new();
        collected(&mut bands, 100.0, 5.0, 40.0);
        collected(&mut bands, 200.0, 6.0, 30.0);
        collected(&mut bands, 300.0, 7.0, 20.0);
        bands.set_fixed("B2", BandField::Decay, true).unwrap();

        bands.delete_band("B1").unwrap();
        assert_eq!(bands.names(), vec!["B0", "B1"]);
        let moved = bands.get("B1").unwrap();
        assert_eq!(moved.position(), Some(300.0));
        assert!(moved.is_fixed(BandField::Decay));

        assert!(matches!(
            bands.delete_band("B7"),
            Err(RamanError::BandNotFound(_))
        ));
        assert!(bands.delete_band("X0").is_err());
    }

    #[test]
    fn test_stable_id_follows_band() {
        let mut bands = BandCollection::new();
        bands.add_band();
        bands.add_band();
        let id = bands.id_of("B1").unwrap();
        bands.delete_band("B0").unwrap();
        assert_eq!(bands.name_of(id).as_deref(), Some("B0"));
    }

    #[test]
    fn test_three_click_collection() {
        let mut bands = BandCollection::new();
        assert!(matches!(bands.start_collecting("B0"), Err(RamanError::NoBands)));

        bands.add_band();
        bands.add_band();
        bands.start_collecting("B1").unwrap();
        assert!(bands.collecting());

        assert_eq!(bands.add_reference(PlotPoint::new(100.0, 10.0)).unwrap(), None);
        assert_eq!(bands.add_reference(PlotPoint::new(95.0, 10.0)).unwrap(), None);
        assert_eq!(bands.add_reference(PlotPoint::new(100.0, 50.0)).unwrap(), Some(1));
        assert!(!bands.collecting());

        let band = bands.get("B1").unwrap();
        assert_eq!(band.values(), Some((100.0, 5.0, 40.0)));
        assert_eq!(bands.useful_len(), 1);
        assert_eq!(bands.len(), 2);
    }

    #[test]
    fn test_coincident_second_click_is_refused() {
        let mut bands = BandCollection::new();
        bands.add_band();
        bands.start_collecting("B0").unwrap();
        bands.add_reference(PlotPoint::new(100.0, 10.0)).unwrap();

        assert!(matches!(
            bands.add_reference(PlotPoint::new(100.001, 20.0)),
            Err(RamanError::CoincidentReference(_))
        ));
        assert_eq!(bands.reference_points().len(), 1);
        assert!(bands.collecting());
    }

    #[test]
    fn test_clear_empty_bands() {
        let mut bands = BandCollection::new();
        bands.add_band();
        collected(&mut bands, 200.0, 6.0, 30.0);
        bands.add_band();
        bands.start_collecting("B2").unwrap();

        bands.clear_empty_bands();
        assert_eq!(bands.len(), 1);
        assert_eq!(bands.get("B0").unwrap().position(), Some(200.0));
        assert!(!bands.collecting());
    }

    #[test]
    fn test_check_fitted_needs_bands() {
        let mut bands = BandCollection::new();
        assert!(!bands.check_fitted());
        bands.add_band();
        assert!(bands.check_fitted());
        bands.clear();
        assert!(bands.is_empty());
    }
}
