//! Property-based tests for microyield
//!
//! - Encoding invariants (fixed layout, bit-identical re-encoding)
//! - Vocabulary determinism and fallback
//! - Exact ensemble blend
//! - Retrain trigger boundary
//! - Run with ProptestConfig::with_cases(100)

mod common;

use common::{fast_config, synthetic_corpus};
use microyield::artifact::MemoryArtifactStore;
use microyield::config::EnsembleWeights;
use microyield::corpus::{CorpusStore, MemoryCorpusStore, TrainingSample};
use microyield::daily_log::DailyLog;
use microyield::features::{FeatureEncoder, SeedVocabulary, FEATURE_COLUMNS};
use microyield::model::EnsembleModel;
use microyield::registry::ModelRegistry;
use microyield::retrain::Retrainer;
use microyield::seed::{Difficulty, SeedProfile};
use proptest::prelude::*;
use quickcheck::quickcheck;
use std::path::Path;
use std::sync::{Arc, OnceLock};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

const VARIETIES: [&str; 5] = ["sunflower", "pea", "radish", "basil", "broccoli---raab"];

fn arb_seed() -> impl Strategy<Value = SeedProfile> {
    (
        prop::sample::select(VARIETIES.to_vec()),
        50.0f64..1000.0,
        5u32..25,
        15.0f64..30.0,
        30.0f64..80.0,
    )
        .prop_map(|(variety, base, days, temp, humidity)| {
            SeedProfile::new(variety, variety, Difficulty::Medium, base, days, temp, humidity)
        })
}

fn arb_log() -> impl Strategy<Value = DailyLog> {
    (
        1u32..30,
        any::<bool>(),
        prop::option::of(5.0f64..40.0),
        prop::option::of(10.0f64..100.0),
        prop::option::of(0.0f64..150.0),
    )
        .prop_map(|(day, watered, temp, humidity, height)| {
            let mut log = DailyLog::new(day, watered);
            log.temperature = temp;
            log.humidity = humidity;
            log.measured_height_mm = height;
            log
        })
}

fn arb_history() -> impl Strategy<Value = Vec<DailyLog>> {
    prop::collection::vec(arb_log(), 1..20)
}

fn encoder() -> FeatureEncoder {
    FeatureEncoder::new(SeedVocabulary::fit(VARIETIES).unwrap())
}

fn trained_model() -> &'static EnsembleModel {
    static MODEL: OnceLock<EnsembleModel> = OnceLock::new();
    MODEL.get_or_init(|| {
        let config = fast_config(Path::new("unused"));
        EnsembleModel::train(&synthetic_corpus(100, 21), &config).unwrap().0
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every non-empty history encodes to the fixed layout
    #[test]
    fn prop_encoding_has_fixed_length(seed in arb_seed(), logs in arb_history()) {
        let encoding = encoder().encode(&seed, &logs).unwrap();
        prop_assert_eq!(encoding.vector.len(), FEATURE_COLUMNS.len());
        prop_assert!(encoding.vector.values().iter().all(|v| v.is_finite()));
    }

    /// Property: re-encoding identical input is bit-identical
    #[test]
    fn prop_reencoding_is_byte_identical(seed in arb_seed(), logs in arb_history()) {
        let first = encoder().encode(&seed, &logs).unwrap();
        let second = encoder().encode(&seed, &logs).unwrap();
        prop_assert_eq!(first.vector.to_bytes(), second.vector.to_bytes());
    }

    /// Property: known varieties always map to the same index
    #[test]
    fn prop_known_variety_is_deterministic(variety in prop::sample::select(VARIETIES.to_vec())) {
        let vocabulary = SeedVocabulary::fit(VARIETIES).unwrap();
        let first = vocabulary.encode(variety);
        let second = vocabulary.encode(&format!("  {}  ", variety.to_uppercase()));
        prop_assert!(first.unknown.is_none());
        prop_assert_eq!(first.index, second.index);
        prop_assert_eq!(Some(first.index), vocabulary.index_of(variety));
    }

    /// Property: unknown varieties never fail and use the sentinel
    #[test]
    fn prop_unknown_variety_falls_back(variety in "[a-z]{3,12}") {
        let vocabulary = SeedVocabulary::fit(VARIETIES).unwrap();
        prop_assume!(vocabulary.index_of(&variety).is_none());
        let code = vocabulary.encode(&variety);
        prop_assert_eq!(code.index, SeedVocabulary::SENTINEL_INDEX);
        let unknown = code.unknown.unwrap();
        prop_assert_eq!(unknown.raw, variety);
    }

    /// Property: the ensemble output is exactly the weighted sum of its parts
    #[test]
    fn prop_ensemble_blend_is_exact(seed in arb_seed(), logs in arb_history()) {
        let model = trained_model();
        let vector = model.encoder().encode(&seed, &logs).unwrap().vector;
        let parts = model.predict_components(std::slice::from_ref(&vector)).unwrap();
        let blended = model.predict(std::slice::from_ref(&vector)).unwrap();
        let w = model.weights();
        let expected = w.forest_weight * parts[0].forest + w.network_weight * parts[0].network;
        prop_assert_eq!(blended[0].to_bits(), expected.to_bits());
    }

    /// Property: the retrain trigger flips exactly at the threshold
    #[test]
    fn prop_retrain_threshold_boundary(threshold in 1usize..15, appends in 0usize..30) {
        let config = fast_config(Path::new("unused"));
        let corpus = Arc::new(MemoryCorpusStore::new(config.retrain.real_sample_weight));
        let retrainer = Retrainer::new(
            corpus.clone(),
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(ModelRegistry::new()),
            config,
        );
        let template = synthetic_corpus(1, 0).remove(0);

        prop_assert!(!retrainer.should_retrain(threshold).unwrap());
        for n in 1..=appends {
            corpus
                .append_real(TrainingSample::synthetic(
                    template.seed_type.clone(),
                    template.features,
                    template.final_yield,
                ))
                .unwrap();
            prop_assert_eq!(retrainer.should_retrain(threshold).unwrap(), n >= threshold);
        }
    }
}

// ============================================================================
// QuickCheck: blend equation over arbitrary sub-model outputs
// ============================================================================

fn blend_matches_formula(forest: f64, network: f64) -> bool {
    let weights = EnsembleWeights::default();
    let blended = weights.blend(forest, network);
    let expected = 0.4 * forest + 0.6 * network;
    blended.to_bits() == expected.to_bits() || (blended.is_nan() && expected.is_nan())
}

fn blend_is_unnormalised(forest: f64, network: f64) -> bool {
    let weights = EnsembleWeights {
        forest_weight: 1.0,
        network_weight: 1.0,
    };
    let blended = weights.blend(forest, network);
    let expected = forest + network;
    blended.to_bits() == expected.to_bits() || (blended.is_nan() && expected.is_nan())
}

quickcheck! {
    fn qc_blend_matches_formula(forest: f64, network: f64) -> bool {
        blend_matches_formula(forest, network)
    }

    fn qc_blend_is_unnormalised(forest: f64, network: f64) -> bool {
        blend_is_unnormalised(forest, network)
    }
}

#[test]
fn test_threshold_scenario_flips_on_tenth_append() {
    let config = fast_config(Path::new("unused"));
    let corpus = Arc::new(MemoryCorpusStore::new(2.0));
    let retrainer = Retrainer::new(
        corpus.clone(),
        Arc::new(MemoryArtifactStore::new()),
        Arc::new(ModelRegistry::new()),
        config,
    );
    let flips: Vec<bool> = synthetic_corpus(12, 3)
        .into_iter()
        .map(|sample| {
            corpus.append_real(sample).unwrap();
            retrainer.should_retrain(10).unwrap()
        })
        .collect();
    assert_eq!(flips.iter().position(|&due| due), Some(9));
}
