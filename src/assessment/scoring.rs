//! Per-answer scoring and per-level aggregation

use serde::{Deserialize, Serialize};

use crate::assessment::problem::LevelId;

/// Outcome of comparing a submitted sequence with the expected one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    /// Exact, same-length, same-order match
    pub is_correct: bool,
    /// Fraction of positions that match, in [0, 1]
    pub similarity: f64,
}

/// Score a submitted recall attempt.
///
/// Positions are compared pairwise up to the shorter of the two sequences and
/// the match count is divided by the expected length. A length mismatch is
/// never an error, it only lowers the similarity.
pub fn score(submitted: &[usize], expected: &[usize]) -> ScoreResult {
    let is_correct = submitted == expected;
    let similarity = if expected.is_empty() {
        0.0
    } else {
        let matches = submitted
            .iter()
            .zip(expected.iter())
            .filter(|(s, e)| s == e)
            .count();
        matches as f64 / expected.len() as f64
    };
    ScoreResult { is_correct, similarity }
}

/// Accumulated results for one level within one battery attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBucket {
    pub level: LevelId,
    pub level_name: String,
    pub correct: u32,
    pub wrong: u32,
    pub similarities: Vec<f64>,
}

impl ScoreBucket {
    pub fn new(level: LevelId, level_name: &str) -> Self {
        Self {
            level,
            level_name: level_name.to_string(),
            correct: 0,
            wrong: 0,
            similarities: Vec::new(),
        }
    }

    /// Record one scored answer
    pub fn record(&mut self, result: &ScoreResult) {
        if result.is_correct {
            self.correct += 1;
        } else {
            self.wrong += 1;
        }
        self.similarities.push(result.similarity);
    }
}

/// Per-level statistics written to the result store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelSummary {
    pub level: LevelId,
    pub level_name: String,
    pub correct: u32,
    pub wrong: u32,
    pub avg_similarity: f64,
}

/// Round to 4 decimal digits
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Collapse score buckets into per-level summaries, skipping levels with no attempts
pub fn aggregate(buckets: &[ScoreBucket]) -> Vec<LevelSummary> {
    buckets
        .iter()
        .filter(|bucket| !bucket.similarities.is_empty())
        .map(|bucket| {
            let mean = bucket.similarities.iter().sum::<f64>() / bucket.similarities.len() as f64;
            LevelSummary {
                level: bucket.level,
                level_name: bucket.level_name.clone(),
                correct: bucket.correct,
                wrong: bucket.wrong,
                avg_similarity: round4(mean),
            }
        })
        .collect()
}
