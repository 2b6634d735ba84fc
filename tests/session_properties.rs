//! Invariants of the session entities: anchors, bands, the fit baseline and
//! parameter construction.

use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use raman_map::anchors::AnchorOutcome;
use raman_map::fitting::{guide_parameters, map_parameters};
use raman_map::parameters::{ParamSpec, PeakSpec, SpectralParameters};
use raman_map::{
    AnchorSet, BandCollection, BandField, BaselineParameters, FitOptions, PlotPoint, RamanError,
    SpectralModel,
};

fn collected_band(bands: &mut BandCollection, p: &str, d: &str, h: &str) {
    let name = BandCollection::name_for(bands.add_band());
    bands.set_entry(&name, BandField::Position, p).unwrap();
    bands.set_entry(&name, BandField::Decay, d).unwrap();
    bands.set_entry(&name, BandField::Intensity, h).unwrap();
}

#[test]
fn test_anchor_domain_never_grows() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..50 {
        let mut anchors = AnchorSet::new();
        anchors.ensure_limits(&array![200.0, 300.0, 400.0]);
        for _ in 0..40 {
            let value: f64 = rng.gen_range(0.0..600.0);
            let outcome = anchors.add(value);
            assert_eq!(anchors.min(), Some(200.0));
            assert_eq!(anchors.max(), Some(400.0));
            if !(200.0..=400.0).contains(&value) {
                assert_eq!(outcome, AnchorOutcome::Ignored);
            }
        }
        assert!(anchors.as_slice().windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_anchor_duplicates_are_ignored() {
    let mut anchors = AnchorSet::new();
    assert_eq!(anchors.add(250.0), AnchorOutcome::Inserted);
    assert_eq!(anchors.add(250.0), AnchorOutcome::Ignored);
    assert_eq!(anchors.len(), 1);
}

#[test]
fn test_anchor_limits_are_protected() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut anchors = AnchorSet::new();
    anchors.ensure_limits(&array![100.0, 500.0]);
    for _ in 0..20 {
        anchors.add(rng.gen_range(100.0..500.0));
    }

    let before = anchors.clone();
    assert!(matches!(
        anchors.delete(100.0),
        Err(RamanError::ProtectedAnchor(_))
    ));
    assert!(matches!(
        anchors.delete(500.0),
        Err(RamanError::ProtectedAnchor(_))
    ));
    assert_eq!(anchors, before);

    while anchors.len() > 2 {
        let interior = anchors.as_slice()[anchors.len() / 2];
        anchors.delete(interior).unwrap();
        assert!(anchors.as_slice().windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(anchors.as_slice(), &[100.0, 500.0]);
}

#[test]
fn test_band_names_stay_contiguous() {
    for n in 1..6 {
        for victim in 0..n {
            let mut bands = BandCollection::new();
            for _ in 0..n {
                bands.add_band();
            }
            // Tag each band with its original index through its position.
            for i in 0..n {
                bands
                    .set_value(&format!("B{}", i), BandField::Position, Some(i as f64))
                    .unwrap();
            }
            bands.set_fixed(&format!("B{}", n - 1), BandField::Decay, true).unwrap();

            bands.delete_band(&format!("B{}", victim)).unwrap();

            let expected: Vec<String> = (0..n - 1).map(|i| format!("B{}", i)).collect();
            assert_eq!(bands.names(), expected);
            let survivors: Vec<f64> = bands.iter().filter_map(|b| b.position()).collect();
            let mut original: Vec<f64> = (0..n).map(|i| i as f64).collect();
            original.remove(victim);
            assert_eq!(survivors, original);
            if victim != n - 1 {
                let last = bands.get(&format!("B{}", n - 2)).unwrap();
                assert!(last.is_fixed(BandField::Decay));
            }
        }
    }
}

#[test]
fn test_band_three_point_gesture() {
    let mut bands = BandCollection::new();
    bands.add_band();
    bands.start_collecting("B0").unwrap();
    assert_eq!(bands.add_reference(PlotPoint::new(100.0, 10.0)).unwrap(), None);
    assert_eq!(bands.add_reference(PlotPoint::new(95.0, 10.0)).unwrap(), None);
    assert_eq!(
        bands.add_reference(PlotPoint::new(100.0, 50.0)).unwrap(),
        Some(0)
    );
    assert_eq!(bands.get("B0").unwrap().values(), Some((100.0, 5.0, 40.0)));
    assert!(!bands.collecting());
}

#[test]
fn test_baseline_two_point_gesture() {
    let mut baseline = BaselineParameters::new();
    baseline.start_selecting();
    baseline.add_reference(PlotPoint::new(100.0, 50.0)).unwrap();
    assert!(baseline.add_reference(PlotPoint::new(200.0, 150.0)).unwrap());
    assert_eq!(baseline.slope(), Some(1.0));
    assert_eq!(baseline.offset(), Some(-50.0));
}

#[test]
fn test_model_peak_value() {
    let mut spectral = SpectralParameters::new(ParamSpec::free(0.0), ParamSpec::free(0.0));
    spectral.push_peak(PeakSpec {
        position: ParamSpec::free(100.0),
        decay: ParamSpec::non_negative(10.0),
        intensity: ParamSpec::non_negative(5.0),
    });
    let y = SpectralModel::evaluate_spectral(&spectral, &array![100.0]).unwrap();
    assert_eq!(y[0], 5.0);
}

#[test]
fn test_map_parameter_windows() {
    let mut bands = BandCollection::new();
    collected_band(&mut bands, "100", "10", "40");
    collected_band(&mut bands, "250.5", "6", "12");
    bands.guide_fitted();
    let baseline = BaselineParameters::new();

    let fixed = FitOptions {
        fix_position_and_decay: true,
        ..FitOptions::default()
    };
    let params = map_parameters(&bands, &baseline, &fixed)
        .unwrap()
        .to_parameters()
        .unwrap();
    for i in 0..2 {
        assert!(!params.get(&format!("x{}", i)).unwrap().vary());
        assert!(!params.get(&format!("d{}", i)).unwrap().vary());
        assert!(params.get(&format!("h{}", i)).unwrap().vary());
    }

    let params = map_parameters(&bands, &baseline, &FitOptions::default())
        .unwrap()
        .to_parameters()
        .unwrap();
    for (name, value) in [("x0", 100.0), ("d0", 10.0), ("x1", 250.5), ("d1", 6.0)] {
        let param = params.get(name).unwrap();
        assert!(param.vary());
        assert_eq!(param.min(), value - 3.0);
        assert_eq!(param.max(), value + 3.0);
    }
}

#[test]
fn test_guide_parameters_count_collected_bands_only() {
    for (total, collected) in [(1, 1), (3, 1), (4, 2), (5, 5)] {
        let mut bands = BandCollection::new();
        for i in 0..total {
            if i < collected {
                collected_band(&mut bands, "100", "5", "10");
            } else {
                bands.add_band();
            }
        }
        let params = guide_parameters(&bands, &BaselineParameters::new(), (0.0, 500.0))
            .unwrap()
            .to_parameters()
            .unwrap();
        assert_eq!(params.len(), 2 + 3 * collected);
    }
}

#[test]
fn test_rejected_entries_leave_band_unchanged() {
    let mut bands = BandCollection::new();
    collected_band(&mut bands, "100", "5", "10");
    bands.save_changes();
    bands.guide_fitted();

    for text in ["abc", "-5", "1.2.3", "1e3", " 7"] {
        assert!(bands.set_entry("B0", BandField::Position, text).is_err());
    }
    assert!(matches!(
        bands.set_entry("B0", BandField::Decay, "0"),
        Err(RamanError::ZeroWidthBand(_))
    ));
    assert_eq!(bands.get("B0").unwrap().values(), Some((100.0, 5.0, 10.0)));
    assert!(bands.check_fitted());
    assert!(bands.check_changes());
}
