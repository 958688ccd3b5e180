//! Collaborators the battery core talks to: the append-only result store and
//! the per-visit session store.

pub mod records;
pub mod session;
pub mod sqlite;

use crate::core::error::BatteryError;
use records::{
    AttemptCounts, DigitSpanOutcome, DigitSpanRecord, SequenceMemoryAttempt, SequenceMemoryRecord,
    SubjectIdentity, SubjectProfile, WisconsinOutcome, WisconsinRecord,
};

pub use session::{MemorySessionStore, SessionStore};
pub use sqlite::SqliteResultStore;

/// Append-only store of completed battery attempts.
///
/// Calls are synchronous and never retried internally.
#[cfg_attr(test, mockall::automock)]
pub trait ResultStore: Send + Sync {
    /// Completed A-Set and B-Set attempts for a subject
    fn count_attempts(&self, subject: &SubjectIdentity) -> Result<AttemptCounts, BatteryError>;

    /// Persist every level row of one attempt, or none of them
    fn record_sequence_memory(
        &self,
        profile: &SubjectProfile,
        attempt: &SequenceMemoryAttempt,
    ) -> Result<(), BatteryError>;

    fn record_digit_span(
        &self,
        profile: &SubjectProfile,
        outcome: &DigitSpanOutcome,
    ) -> Result<(), BatteryError>;

    fn record_wisconsin(
        &self,
        profile: &SubjectProfile,
        outcome: &WisconsinOutcome,
    ) -> Result<(), BatteryError>;

    /// All rows, newest first
    fn list_sequence_memory(&self) -> Result<Vec<SequenceMemoryRecord>, BatteryError>;

    /// All rows, newest first
    fn list_digit_span(&self) -> Result<Vec<DigitSpanRecord>, BatteryError>;

    /// All rows, newest first
    fn list_wisconsin(&self) -> Result<Vec<WisconsinRecord>, BatteryError>;
}

impl std::fmt::Debug for dyn ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResultStore")
    }
}
