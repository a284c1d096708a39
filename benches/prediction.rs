//! Prediction path benchmarks
//!
//! - Feature encoding from a log history
//! - Ensemble inference (forest + network + blend)
//! - Full prediction with suggestions

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use microyield::config::EngineConfig;
use microyield::corpus::TrainingSample;
use microyield::daily_log::DailyLog;
use microyield::features::{CropFeatures, FeatureEncoder, SeedVocabulary};
use microyield::artifact::{CorpusCounts, ModelArtifactSet, ModelVersion};
use microyield::model::{EnsembleModel, TrainingReport};
use microyield::registry::ModelRegistry;
use microyield::seed::{Difficulty, SeedProfile};
use microyield::PredictionService;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn sunflower() -> SeedProfile {
    SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0)
}

/// Log history of `days` entries around the ideal climate
fn history(days: u32, rng: &mut StdRng) -> Vec<DailyLog> {
    (1..=days)
        .map(|day| {
            DailyLog::new(day, rng.gen_bool(0.9))
                .with_temperature(22.5 + rng.gen_range(-5.0..5.0))
                .with_humidity(50.0 + rng.gen_range(-15.0..15.0))
        })
        .collect()
}

/// Train a small ensemble on synthetic sunflower grows
fn trained_model() -> (EnsembleModel, TrainingReport) {
    let mut rng = StdRng::seed_from_u64(42);
    let seed = sunflower();
    let samples: Vec<TrainingSample> = (0..200)
        .map(|_| {
            let logs = history(rng.gen_range(3..=10), &mut rng);
            let features = CropFeatures::from_history(&seed, &logs, 1290.0).unwrap();
            let final_yield = 600.0 - 8.0 * features.temp_deviation - 30.0 * features.missed_watering_days;
            TrainingSample::synthetic("sunflower", features, final_yield)
        })
        .collect();

    let mut config = EngineConfig::default();
    config.network.epochs = 30;
    EnsembleModel::train(&samples, &config).unwrap()
}

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let encoder = FeatureEncoder::new(SeedVocabulary::fit(["pea", "radish", "sunflower"]).unwrap());
    let seed = sunflower();
    let mut rng = StdRng::seed_from_u64(1);

    for days in [1u32, 10, 30] {
        let logs = history(days, &mut rng);
        group.bench_with_input(BenchmarkId::from_parameter(days), &logs, |b, logs| {
            b.iter(|| encoder.encode(black_box(&seed), black_box(logs)).unwrap());
        });
    }

    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let (model, report) = trained_model();
    let seed = sunflower();
    let logs = history(10, &mut StdRng::seed_from_u64(2));
    let vector = model.encoder().encode(&seed, &logs).unwrap().vector;

    let mut group = c.benchmark_group("inference");
    for batch in [1usize, 64] {
        let vectors = vec![vector.clone(); batch];
        group.bench_with_input(BenchmarkId::from_parameter(batch), &vectors, |b, vectors| {
            b.iter(|| model.predict(black_box(vectors)).unwrap());
        });
    }
    group.finish();

    let set = ModelArtifactSet::new(ModelVersion::FIRST, None, model, report, CorpusCounts::default());
    let service = PredictionService::new(Arc::new(ModelRegistry::with_model(Arc::new(set))));
    c.bench_function("predict_with_suggestions", |b| {
        b.iter(|| service.predict(black_box(&seed), black_box(&logs)).unwrap());
    });
}

criterion_group!(benches, bench_encoding, bench_inference);
criterion_main!(benches);
