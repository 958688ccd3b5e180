//! Alternation between the sequence-memory and digit-span batteries

use std::fmt::Display;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::error::BatteryError;
use crate::storage::records::{AttemptCounts, SubjectIdentity};
use crate::storage::ResultStore;

/// Battery administered at the start of a visit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatteryKind {
    /// Visual sequence memory
    ASet,
    /// Digit span
    BSet,
}

impl BatteryKind {
    /// Even totals start the A-Set, odd totals the B-Set
    pub fn from_counts(counts: &AttemptCounts) -> Self {
        if counts.total() % 2 == 0 {
            BatteryKind::ASet
        } else {
            BatteryKind::BSet
        }
    }

    /// Where the subject's device goes to begin this battery
    pub fn entry_target(&self) -> &'static str {
        match self {
            BatteryKind::ASet => "/a-set/practice",
            BatteryKind::BSet => "/test",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatteryKind::ASet => "a_set",
            BatteryKind::BSet => "b_set",
        }
    }
}

impl Display for BatteryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryKind::ASet => write!(f, "A-Set"),
            BatteryKind::BSet => write!(f, "B-Set"),
        }
    }
}

/// Decide which battery a returning subject starts with
pub fn select_battery(
    store: &dyn ResultStore,
    subject: &SubjectIdentity,
) -> Result<BatteryKind, BatteryError> {
    let counts = store.count_attempts(subject)?;
    let kind = BatteryKind::from_counts(&counts);
    info!(
        "Subject {}/{} has {} A-Set and {} B-Set attempts, selecting {}",
        subject.administrator, subject.name, counts.a_set, counts.b_set, kind
    );
    Ok(kind)
}
