//! Seed variety vocabulary
//!
//! A bijection between canonical variety slugs and dense indices, fixed at
//! training time and shipped inside the artifact set. Lookups at inference
//! never fail: an unrecognised slug maps to [`SeedVocabulary::SENTINEL_INDEX`]
//! and the caller receives an [`UnknownCategory`] to log.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical form of a variety slug.
///
/// Trims, lower-cases, drops commas and rewrites the `-/-` separator to
/// `---`, so `"Broccoli-/-Raab"` and `"broccoli---raab"` are the same key.
#[must_use]
pub fn normalize_variety(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(',', "")
        .replace("-/-", "---")
}

/// Recoverable warning: the variety was not in the training vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory {
    /// Slug as supplied by the caller
    pub raw: String,
    /// Slug after normalisation
    pub normalized: String,
    /// Vocabulary entry the encoding fell back to
    pub fallback: String,
}

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown seed variety '{}' (normalized '{}'), encoded as '{}'; prediction accuracy is degraded",
            self.raw, self.normalized, self.fallback
        )
    }
}

/// Result of a vocabulary lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCode {
    /// Dense index fed to the models
    pub index: usize,
    /// Set when the fallback index was used
    pub unknown: Option<UnknownCategory>,
}

/// Sorted, de-duplicated set of canonical variety slugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedVocabulary {
    classes: Vec<String>,
}

impl SeedVocabulary {
    /// Index used for any variety outside the vocabulary: the first class
    /// in sorted order.
    pub const SENTINEL_INDEX: usize = 0;

    /// Fit a vocabulary from the varieties present in a training corpus.
    ///
    /// # Errors
    ///
    /// Returns `Error::TrainingFailure` if no non-empty variety is supplied
    pub fn fit<'a, I>(varieties: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = varieties
            .into_iter()
            .map(normalize_variety)
            .filter(|slug| !slug.is_empty())
            .collect();
        classes.sort_unstable();
        classes.dedup();

        if classes.is_empty() {
            return Err(Error::TrainingFailure(
                "seed vocabulary is empty: corpus has no seed_type values".to_string(),
            ));
        }
        Ok(Self { classes })
    }

    /// Check a deserialized vocabulary is non-empty, canonical and strictly sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Artifact` if the stored vocabulary is corrupt
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::Artifact("stored seed vocabulary is empty".to_string()));
        }
        let canonical = self.classes.iter().all(|c| *c == normalize_variety(c));
        let sorted = self.classes.windows(2).all(|pair| pair[0] < pair[1]);
        if !(canonical && sorted) {
            return Err(Error::Artifact(
                "stored seed vocabulary is not canonical and strictly sorted".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of known varieties
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True if the vocabulary has no entries (never the case once fitted)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Known varieties in index order
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Index of a variety known to the vocabulary
    #[must_use]
    pub fn index_of(&self, variety: &str) -> Option<usize> {
        self.classes
            .binary_search(&normalize_variety(variety))
            .ok()
    }

    /// Variety at an index
    #[must_use]
    pub fn variety(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Encode a variety, falling back to the sentinel for unknown slugs.
    #[must_use]
    pub fn encode(&self, variety: &str) -> CategoryCode {
        if let Some(index) = self.index_of(variety) {
            return CategoryCode {
                index,
                unknown: None,
            };
        }

        CategoryCode {
            index: Self::SENTINEL_INDEX,
            unknown: Some(UnknownCategory {
                raw: variety.to_string(),
                normalized: normalize_variety(variety),
                fallback: self
                    .variety(Self::SENTINEL_INDEX)
                    .unwrap_or_default()
                    .to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> SeedVocabulary {
        SeedVocabulary::fit(["sunflower", "pea-shoots", "broccoli-/-raab", "radish", "sunflower"])
            .unwrap()
    }

    #[test]
    fn test_fit_sorts_and_dedups() {
        let v = vocab();
        assert_eq!(v.len(), 4);
        assert_eq!(v.classes(), ["broccoli---raab", "pea-shoots", "radish", "sunflower"]);
    }

    #[test]
    fn test_known_variety_is_stable() {
        let v = vocab();
        assert_eq!(v.encode("radish").index, 2);
        assert_eq!(v.encode("radish").index, 2);
        assert!(v.encode("radish").unknown.is_none());
    }

    #[test]
    fn test_alternate_separator_forms_match() {
        let v = vocab();
        assert_eq!(v.index_of("broccoli-/-raab"), Some(0));
        assert_eq!(v.index_of("Broccoli---Raab"), Some(0));
        assert_eq!(v.index_of(" broccoli,-/-raab "), Some(0));
    }

    #[test]
    fn test_unknown_variety_falls_back_to_sentinel() {
        let v = vocab();
        let code = v.encode("dragon-fruit");
        assert_eq!(code.index, SeedVocabulary::SENTINEL_INDEX);
        let warning = code.unknown.unwrap();
        assert_eq!(warning.fallback, "broccoli---raab");
        assert!(warning.to_string().contains("dragon-fruit"));
    }

    #[test]
    fn test_empty_fit_is_training_failure() {
        let result = SeedVocabulary::fit(["", "  "]);
        assert!(matches!(result, Err(Error::TrainingFailure(_))));
    }

    #[test]
    fn test_serde_preserves_order() {
        let v = vocab();
        let json = serde_json::to_string(&v).unwrap();
        let restored: SeedVocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(v, restored);
    }
}
