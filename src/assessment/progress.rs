use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assessment::problem::{compose_problem, LevelId, Problem};
use crate::assessment::scoring::{score, ScoreBucket, ScoreResult};
use crate::core::config::BatteryConfig;
use crate::core::error::BatteryError;

/// Where an attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Working through a level; `problem_in_level` is 1-based
    InLevel { level_index: usize, problem_in_level: u32 },
    /// Every level has been administered
    Completed,
}

/// A problem handed to the subject together with its position in the level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedProblem {
    #[serde(flatten)]
    pub problem: Problem,
    pub problem_in_level: u32,
    pub total_problems: u32,
}

/// Result of asking for the next problem
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Problem(IssuedProblem),
    Completed,
}

/// Mutable state of one subject's attempt at the sequence-memory battery.
///
/// Lives in the session store between requests, so it is plain serializable data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub current_level_index: usize,
    pub problem_in_level: u32,
    pub score_by_level: Vec<ScoreBucket>,
    pub current_problem: Option<Problem>,
}

impl SessionProgress {
    /// Fresh attempt: first level, first problem, zeroed buckets
    pub fn start(config: &BatteryConfig) -> Self {
        Self {
            current_level_index: 0,
            problem_in_level: 1,
            score_by_level: config
                .levels
                .iter()
                .enumerate()
                .map(|(i, level)| ScoreBucket::new(LevelId(i), &level.name))
                .collect(),
            current_problem: None,
        }
    }

    pub fn state(&self, config: &BatteryConfig) -> ProgressState {
        if self.current_level_index >= config.levels.len() {
            ProgressState::Completed
        } else {
            ProgressState::InLevel {
                level_index: self.current_level_index,
                problem_in_level: self.problem_in_level,
            }
        }
    }

    /// Issue the next problem, or report that every level is done.
    ///
    /// Asking again before answering replaces the outstanding problem.
    pub fn next_problem<R: Rng + ?Sized>(
        &mut self,
        config: &BatteryConfig,
        rng: &mut R,
    ) -> Result<NextStep, BatteryError> {
        let level_index = match self.state(config) {
            ProgressState::Completed => return Ok(NextStep::Completed),
            ProgressState::InLevel { level_index, .. } => level_index,
        };

        let definition = &config.levels[level_index];
        let problem = compose_problem(LevelId(level_index), definition, &config.canvas, rng)?;
        self.current_problem = Some(problem.clone());

        debug!(
            "Issued {} problem {}/{}",
            definition.name, self.problem_in_level, config.problems_per_level
        );

        Ok(NextStep::Problem(IssuedProblem {
            problem,
            problem_in_level: self.problem_in_level,
            total_problems: config.problems_per_level,
        }))
    }

    /// Score an answer against the outstanding problem and advance.
    ///
    /// Completion is not decided here; the next `next_problem` call discovers it.
    pub fn answer_submitted(
        &mut self,
        answer: &[usize],
        problems_per_level: u32,
    ) -> Result<ScoreResult, BatteryError> {
        let problem = self.current_problem.as_ref().ok_or_else(|| {
            BatteryError::InvalidState("no problem has been issued".to_string())
        })?;
        problem.check_answer_ids(answer)?;

        let level = problem.scored_level().ok_or_else(|| {
            BatteryError::InvalidState("outstanding problem is not a scored problem".to_string())
        })?;
        let bucket = self.score_by_level.get_mut(level.0).ok_or_else(|| {
            BatteryError::InvalidState(format!("no score bucket for level {}", level.0))
        })?;

        let result = score(answer, &problem.flash_sequence);
        bucket.record(&result);
        self.current_problem = None;

        self.problem_in_level += 1;
        if self.problem_in_level > problems_per_level {
            self.current_level_index += 1;
            self.problem_in_level = 1;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::scoring::aggregate;
    use crate::core::config::LevelDefinition;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn issue(progress: &mut SessionProgress, config: &BatteryConfig, rng: &mut StdRng) -> IssuedProblem {
        match progress.next_problem(config, rng).unwrap() {
            NextStep::Problem(issued) => issued,
            NextStep::Completed => panic!("battery completed too early"),
        }
    }

    #[test]
    fn test_start_state() {
        let config = BatteryConfig::default();
        let progress = SessionProgress::start(&config);
        assert_eq!(progress.state(&config), ProgressState::InLevel { level_index: 0, problem_in_level: 1 });
        assert_eq!(progress.score_by_level.len(), config.levels.len());
        assert!(progress.current_problem.is_none());
    }

    #[test]
    fn test_answer_without_problem_is_invalid() {
        let config = BatteryConfig::default();
        let mut progress = SessionProgress::start(&config);
        let before = progress.clone();
        let err = progress.answer_submitted(&[0, 1, 2], config.problems_per_level).unwrap_err();
        assert!(matches!(err, BatteryError::InvalidState(_)));
        assert_eq!(progress, before);
    }

    #[test]
    fn test_unknown_region_leaves_state_untouched() {
        let config = BatteryConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut progress = SessionProgress::start(&config);
        issue(&mut progress, &config, &mut rng);
        let before = progress.clone();
        let err = progress.answer_submitted(&[0, 99], config.problems_per_level).unwrap_err();
        assert!(matches!(err, BatteryError::MalformedInput(_)));
        assert_eq!(progress, before);
    }

    #[test]
    fn test_level_advances_after_problems_per_level() {
        let config = BatteryConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut progress = SessionProgress::start(&config);

        for n in 1..=config.problems_per_level {
            let issued = issue(&mut progress, &config, &mut rng);
            assert_eq!(issued.problem_in_level, n);
            assert_eq!(issued.total_problems, config.problems_per_level);
            progress.answer_submitted(&[], config.problems_per_level).unwrap();
        }

        assert_eq!(progress.current_level_index, 1);
        assert_eq!(progress.problem_in_level, 1);
    }

    #[test]
    fn test_completes_after_all_levels() {
        let config = BatteryConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut progress = SessionProgress::start(&config);

        let total = config.levels.len() as u32 * config.problems_per_level;
        for _ in 0..total {
            let issued = issue(&mut progress, &config, &mut rng);
            let answer = issued.problem.flash_sequence.clone();
            progress.answer_submitted(&answer, config.problems_per_level).unwrap();
        }

        assert_eq!(progress.state(&config), ProgressState::Completed);
        assert_eq!(progress.next_problem(&config, &mut rng).unwrap(), NextStep::Completed);
        // Completion does not mutate
        assert_eq!(progress.next_problem(&config, &mut rng).unwrap(), NextStep::Completed);
    }

    #[test]
    fn test_single_level_all_correct() {
        let config = BatteryConfig {
            levels: vec![LevelDefinition::new("Level 1", 5, 3)],
            problems_per_level: 5,
            ..BatteryConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let mut progress = SessionProgress::start(&config);

        for _ in 0..5 {
            let issued = issue(&mut progress, &config, &mut rng);
            let result = progress
                .answer_submitted(&issued.problem.flash_sequence, config.problems_per_level)
                .unwrap();
            assert!(result.is_correct);
        }

        let bucket = &progress.score_by_level[0];
        assert_eq!(bucket.correct, 5);
        assert_eq!(bucket.wrong, 0);

        let summary = aggregate(&progress.score_by_level);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].avg_similarity, 1.0);
        assert_eq!(progress.next_problem(&config, &mut rng).unwrap(), NextStep::Completed);
    }

    #[test]
    fn test_reissue_replaces_outstanding_problem() {
        let config = BatteryConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progress = SessionProgress::start(&config);
        issue(&mut progress, &config, &mut rng);
        let second = issue(&mut progress, &config, &mut rng);
        assert_eq!(progress.current_problem.as_ref(), Some(&second.problem));
        assert_eq!(second.problem_in_level, 1);
    }

    #[test]
    fn test_progress_survives_json_round_trip() {
        let config = BatteryConfig::default();
        let mut rng = StdRng::seed_from_u64(6);
        let mut progress = SessionProgress::start(&config);
        issue(&mut progress, &config, &mut rng);

        let value = serde_json::to_value(&progress).unwrap();
        let restored: SessionProgress = serde_json::from_value(value).unwrap();
        assert_eq!(restored, progress);
    }
}
