//! Shared fixtures: seed catalog, simulated grows and a fast training config

#![allow(dead_code)]

use microyield::config::EngineConfig;
use microyield::corpus::TrainingSample;
use microyield::daily_log::DailyLog;
use microyield::features::CropFeatures;
use microyield::seed::{Difficulty, SeedProfile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

pub fn sunflower() -> SeedProfile {
    SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0)
}

pub fn catalog() -> Vec<SeedProfile> {
    vec![
        sunflower(),
        SeedProfile::new("pea", "Pea Shoots", Difficulty::Easy, 500.0, 12, 20.0, 55.0),
        SeedProfile::new("radish", "Radish", Difficulty::Easy, 350.0, 8, 21.0, 50.0),
        SeedProfile::new("basil", "Basil", Difficulty::Hard, 200.0, 18, 24.0, 60.0),
    ]
}

/// One simulated grow: logs plus the yield they would produce.
pub fn simulate(seed: &SeedProfile, rng: &mut StdRng) -> (Vec<DailyLog>, f64) {
    let days = rng.gen_range(3..=seed.growth_days);
    let drift = rng.gen_range(-6.0..6.0);
    let dryness = rng.gen_range(-20.0..20.0);
    let skip_rate = rng.gen_range(0.0..0.3);

    let logs: Vec<DailyLog> = (1..=days)
        .map(|day| {
            DailyLog::new(day, !rng.gen_bool(skip_rate))
                .with_temperature(seed.ideal_temp + drift + rng.gen_range(-1.0..1.0))
                .with_humidity(seed.ideal_humidity + dryness + rng.gen_range(-3.0..3.0))
        })
        .collect();

    let missed = logs.iter().filter(|l| !l.watered).count();
    #[allow(clippy::cast_precision_loss)]
    let penalty = 0.04 * f64::abs(drift) + 0.005 * f64::abs(dryness) + 0.3 * missed as f64 / f64::from(days);
    let final_yield = (seed.base_yield * (1.0 - penalty) + rng.gen_range(-5.0..5.0)).max(0.0);
    (logs, final_yield)
}

/// Synthetic corpus rows derived from simulated grows.
pub fn synthetic_corpus(n: usize, seed: u64) -> Vec<TrainingSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let catalog = catalog();
    (0..n)
        .map(|i| {
            let profile = &catalog[i % catalog.len()];
            let (logs, final_yield) = simulate(profile, &mut rng);
            let features = CropFeatures::from_history(profile, &logs, 1290.0).unwrap();
            TrainingSample::synthetic(profile.seed_type.clone(), features, final_yield)
        })
        .collect()
}

/// Small models with a permissive gate so tests train in well under a second.
pub fn fast_config(data_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.paths.data_dir = data_dir.to_path_buf();
    config.forest.n_trees = 10;
    config.forest.max_depth = 8;
    config.network.hidden_layers = vec![16, 8];
    config.network.epochs = 40;
    config.network.learning_rate = 0.01;
    config.network.batch_size = 16;
    config.network.patience = 10;
    config.retrain.min_new_samples = 10;
    config.retrain.quality_gate.min_within_50g = 0.0;
    config
}
