//! Subject identity and the append-only result records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::scoring::LevelSummary;
use crate::core::error::BatteryError;

pub const DIGIT_SPAN_TEST_NAME: &str = "Digit Span Test";
pub const SEQUENCE_MEMORY_TEST_NAME: &str = "Sequence Memory Test";
pub const WISCONSIN_TEST_NAME: &str = "Wisconsin Card Sorting Test";

/// Details collected when a visit starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    /// Administrator running the session
    #[serde(alias = "nickname")]
    pub administrator: String,
    /// Subject name
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(alias = "test_date")]
    pub test_date: String,
}

impl SubjectProfile {
    /// Trim every text field and reject blanks or a zero age
    pub fn normalized(self) -> Result<Self, BatteryError> {
        let profile = Self {
            administrator: self.administrator.trim().to_string(),
            name: self.name.trim().to_string(),
            age: self.age,
            gender: self.gender.trim().to_string(),
            test_date: self.test_date.trim().to_string(),
        };

        let missing: Vec<&str> = [
            ("administrator", profile.administrator.is_empty()),
            ("name", profile.name.is_empty()),
            ("age", profile.age == 0),
            ("gender", profile.gender.is_empty()),
            ("testDate", profile.test_date.is_empty()),
        ]
        .iter()
        .filter(|(_, blank)| *blank)
        .map(|(field, _)| *field)
        .collect();

        if missing.is_empty() {
            Ok(profile)
        } else {
            Err(BatteryError::MalformedInput(format!(
                "missing subject fields: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity {
            administrator: self.administrator.clone(),
            name: self.name.clone(),
        }
    }
}

/// Key for historical attempt counts; compared by exact string match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubjectIdentity {
    pub administrator: String,
    pub name: String,
}

/// Completed attempts per battery for one subject
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptCounts {
    pub a_set: u64,
    pub b_set: u64,
}

impl AttemptCounts {
    pub fn total(&self) -> u64 {
        self.a_set + self.b_set
    }
}

/// One finished sequence-memory attempt, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMemoryAttempt {
    pub attempt_id: Uuid,
    pub levels: Vec<LevelSummary>,
}

/// Digit-span metrics reported by the subject's device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DigitSpanOutcome {
    pub high_score: u32,
    pub failed_attempts: Vec<serde_json::Value>,
}

/// Wisconsin card-sorting metrics reported by the subject's device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WisconsinOutcome {
    pub perseverative_responses: u32,
    pub trials_to_complete_first_category: u32,
    pub failure_to_maintain_set: u32,
    pub correct_rate: f64,
}

impl WisconsinOutcome {
    pub fn validate(&self) -> Result<(), BatteryError> {
        if !self.correct_rate.is_finite() || self.correct_rate < 0.0 {
            return Err(BatteryError::MalformedInput(format!(
                "correctRate must be a non-negative number, got {}",
                self.correct_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DigitSpanRecord {
    pub id: i64,
    #[serde(flatten)]
    pub profile: SubjectProfile,
    pub test_name: String,
    #[serde(flatten)]
    pub outcome: DigitSpanOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceMemoryRecord {
    pub id: i64,
    pub attempt_id: String,
    #[serde(flatten)]
    pub profile: SubjectProfile,
    pub test_name: String,
    pub level_name: String,
    pub level_index: u32,
    pub correct: u32,
    pub wrong: u32,
    pub avg_similarity: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WisconsinRecord {
    pub id: i64,
    #[serde(flatten)]
    pub profile: SubjectProfile,
    pub test_name: String,
    #[serde(flatten)]
    pub outcome: WisconsinOutcome,
    pub recorded_at: DateTime<Utc>,
}
