use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assessment::geometry::{place_regions, Region};
use crate::core::config::{BatteryConfig, CanvasConfig, LevelDefinition};
use crate::core::error::BatteryError;

/// Position of a level in the configured level list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(pub usize);

/// Which part of the battery a problem belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum ProblemLevel {
    /// Unscored warm-up round
    Practice,
    /// Scored level at the given position
    Scored(LevelId),
}

/// A single sequence-memory stimulus and its expected answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<ProblemLevel>,
    pub level_name: String,
    pub flash_count: usize,
    pub regions: Vec<Region>,
    pub flash_sequence: Vec<usize>,
}

impl Problem {
    /// Scored level this problem counts toward, if any
    pub fn scored_level(&self) -> Option<LevelId> {
        match self.level {
            Some(ProblemLevel::Scored(id)) => Some(id),
            _ => None,
        }
    }

    /// Ensure every id in `answer` names a region of this problem
    pub fn check_answer_ids(&self, answer: &[usize]) -> Result<(), BatteryError> {
        match answer.iter().find(|id| **id >= self.regions.len()) {
            Some(bad) => Err(BatteryError::MalformedInput(format!(
                "region id {} is not part of the current problem ({} regions)",
                bad,
                self.regions.len()
            ))),
            None => Ok(()),
        }
    }
}

fn compose<R: Rng + ?Sized>(
    level: ProblemLevel,
    definition: &LevelDefinition,
    canvas: &CanvasConfig,
    rng: &mut R,
) -> Result<Problem, BatteryError> {
    if definition.flash_count > definition.box_count {
        return Err(BatteryError::ConfigurationError(format!(
            "level '{}' flashes {} of only {} boxes",
            definition.name, definition.flash_count, definition.box_count
        )));
    }

    let regions = place_regions(definition.box_count, canvas, rng)?;
    // Draw order is the flash order
    let flash_sequence = index::sample(rng, definition.box_count, definition.flash_count).into_vec();

    Ok(Problem {
        level: Some(level),
        level_name: definition.name.clone(),
        flash_count: definition.flash_count,
        regions,
        flash_sequence,
    })
}

/// Compose a scored problem for the level at `level_id`
pub fn compose_problem<R: Rng + ?Sized>(
    level_id: LevelId,
    definition: &LevelDefinition,
    canvas: &CanvasConfig,
    rng: &mut R,
) -> Result<Problem, BatteryError> {
    compose(ProblemLevel::Scored(level_id), definition, canvas, rng)
}

/// Compose a practice problem from the fixed practice level
pub fn compose_practice_problem<R: Rng + ?Sized>(
    config: &BatteryConfig,
    rng: &mut R,
) -> Result<Problem, BatteryError> {
    compose(ProblemLevel::Practice, &config.practice_level, &config.canvas, rng)
}
