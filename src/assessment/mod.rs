//! Battery core for the sequence-memory assessment
//!
//! Region placement, problem composition, scoring, per-attempt progress and
//! the battery alternation rule. Nothing here touches I/O except through the
//! `ResultStore` handed to the selector.

pub mod geometry;
pub mod problem;
pub mod scoring;
pub mod progress;
pub mod selector;

// Re-export for convenience
pub use geometry::{place_regions, Region};
pub use problem::{compose_practice_problem, compose_problem, LevelId, Problem};
pub use progress::{NextStep, ProgressState, SessionProgress};
pub use scoring::{aggregate, score, LevelSummary, ScoreBucket, ScoreResult};
pub use selector::{select_battery, BatteryKind};
