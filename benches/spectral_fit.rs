//! Benchmarks for model evaluation and single-point fits.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use raman_map::fitting::BatchFitter;
use raman_map::model::lorentzian;
use raman_map::{BandCollection, BandField, BaselineParameters, FitOptions, LmConfig, SpectralModel};

/// Bands evenly spaced over 200..1800 cm-1.
fn bands(count: usize) -> BandCollection {
    let mut bands = BandCollection::new();
    for i in 0..count {
        let name = BandCollection::name_for(bands.add_band());
        let position = 200.0 + 1600.0 * (i as f64 + 0.5) / count as f64;
        bands
            .set_value(&name, BandField::Position, Some(position))
            .unwrap();
        bands.set_value(&name, BandField::Decay, Some(12.0)).unwrap();
        bands
            .set_value(&name, BandField::Intensity, Some(100.0))
            .unwrap();
    }
    bands.guide_fitted();
    bands
}

fn noisy_spectrum(bands: &BandCollection, frequencies: &Array1<f64>) -> Array1<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let noise = Normal::new(0.0, 0.5).unwrap();
    frequencies.mapv(|f| {
        let signal: f64 = bands
            .iter()
            .filter_map(|b| b.values())
            .map(|(x, d, h)| lorentzian(f + 1.0, x, d, h * 1.1))
            .sum();
        signal + 5.0 + noise.sample(&mut rng)
    })
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_evaluate");
    let frequencies = Array1::linspace(200.0, 1800.0, 1024);

    for count in [1, 4, 16] {
        let fitter = BatchFitter::new(
            &bands(count),
            &BaselineParameters::new(),
            &FitOptions::default(),
            LmConfig::default(),
        )
        .unwrap();
        let params = fitter.parameters().clone();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| SpectralModel::evaluate(black_box(&params), black_box(&frequencies)))
        });
    }
    group.finish();
}

fn bench_point_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_fit");
    group.sample_size(20);
    let frequencies = Array1::linspace(200.0, 1800.0, 1024);
    let key = ("0".to_string(), "0".to_string());

    for count in [1, 4, 8] {
        let bands = bands(count);
        let observed = noisy_spectrum(&bands, &frequencies);
        for fixed in [false, true] {
            let options = FitOptions {
                fix_position_and_decay: fixed,
                ..FitOptions::default()
            };
            let fitter = BatchFitter::new(
                &bands,
                &BaselineParameters::new(),
                &options,
                LmConfig::default(),
            )
            .unwrap();
            let label = if fixed { "fixed" } else { "windowed" };
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, _| {
                b.iter(|| fitter.fit_point(black_box(&key), &frequencies, &observed))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_point_fit);
criterion_main!(benches);
