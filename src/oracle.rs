//! Scoring oracles.
//!
//! An oracle maps a sentence to a log-probability-like score in
//! `(-inf, 0]`: more negative means less like natural language. The
//! search core only ever sees this trait — a neural scorer is one
//! implementation (an external collaborator), the corpus-frequency
//! scorer below is the in-tree default, and the stubs keep tests cheap.
//!
//! Oracles are heuristics. They must not mutate what they judge, and
//! deterministic constraints belong in the validator, not here.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::fragment::Fragment;

/// A pure scoring function over canonical sentences.
///
/// For a fixed configuration the same input must score bit-identically
/// within a process; replays of a roll-out depend on it.
pub trait Oracle {
    fn score(&self, sentence: &str) -> Result<f64>;
}

/// Scores a sentence by summed per-word corpus log-frequencies.
///
/// The data file is JSON of the shape `{"frequencies": {"word": count}}`
/// (counts need not be normalised). Words absent from the table score at
/// a configurable floor, so sentences full of out-of-corpus words sink
/// rather than error.
pub struct FrequencyOracle {
    log_probs: FxHashMap<String, f64>,
    floor: f64,
}

#[derive(Deserialize)]
struct FrequencyFile {
    frequencies: FxHashMap<String, f64>,
}

impl FrequencyOracle {
    pub const DEFAULT_FLOOR: f64 = -20.0;

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read oracle data {}: {e}", path.display()))
        })?;
        let parsed: FrequencyFile = serde_json::from_str(&text)?;
        Self::from_counts(parsed.frequencies)
    }

    pub fn from_counts(counts: FxHashMap<String, f64>) -> Result<Self> {
        let total: f64 = counts.values().filter(|c| **c > 0.0).sum();
        if total <= 0.0 {
            return Err(Error::Config(
                "oracle frequency table has no positive counts".to_string(),
            ));
        }
        let log_probs = counts
            .into_iter()
            .filter(|(_, c)| *c > 0.0)
            .map(|(w, c)| (w, (c / total).ln().min(0.0)))
            .collect();
        Ok(FrequencyOracle {
            log_probs,
            floor: Self::DEFAULT_FLOOR,
        })
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor.min(0.0);
        self
    }
}

impl Oracle for FrequencyOracle {
    fn score(&self, sentence: &str) -> Result<f64> {
        let frag = Fragment::new(sentence);
        let mut total = 0.0;
        for word in &frag.words {
            total += self.log_probs.get(word).copied().unwrap_or(self.floor);
        }
        Ok(total.min(0.0))
    }
}

/// Test stub: `-(character count)`. Shorter sentences score better, so
/// behaviour under it is easy to predict by hand.
pub struct WordLengthOracle;

impl Oracle for WordLengthOracle {
    fn score(&self, sentence: &str) -> Result<f64> {
        Ok(-(sentence.chars().count() as f64))
    }
}

/// Test stub: the same score for everything.
pub struct ConstantOracle(pub f64);

impl Oracle for ConstantOracle {
    fn score(&self, sentence: &str) -> Result<f64> {
        let _ = sentence;
        Ok(self.0.min(0.0))
    }
}
