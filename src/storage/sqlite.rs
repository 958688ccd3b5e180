use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Row};

use crate::core::error::BatteryError;
use crate::storage::records::{
    AttemptCounts, DigitSpanOutcome, DigitSpanRecord, SequenceMemoryAttempt, SequenceMemoryRecord,
    SubjectIdentity, SubjectProfile, WisconsinOutcome, WisconsinRecord, DIGIT_SPAN_TEST_NAME,
    SEQUENCE_MEMORY_TEST_NAME, WISCONSIN_TEST_NAME,
};
use crate::storage::ResultStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS digit_span_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    administrator TEXT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    test_date TEXT NOT NULL,
    test_name TEXT NOT NULL,
    high_score INTEGER NOT NULL,
    failed_attempts TEXT,
    recorded_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sequence_memory_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    attempt_id TEXT NOT NULL,
    administrator TEXT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    test_date TEXT NOT NULL,
    test_name TEXT NOT NULL,
    level_name TEXT NOT NULL,
    level_index INTEGER NOT NULL,
    correct INTEGER NOT NULL,
    wrong INTEGER NOT NULL,
    avg_similarity REAL NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS wisconsin_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    administrator TEXT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    test_date TEXT NOT NULL,
    test_name TEXT NOT NULL,
    perseverative_responses INTEGER NOT NULL,
    trials_to_complete_first_category INTEGER NOT NULL,
    failure_to_maintain_set INTEGER NOT NULL,
    correct_rate REAL NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_digit_span_subject ON digit_span_results (administrator, name);
CREATE INDEX IF NOT EXISTS idx_sequence_memory_subject ON sequence_memory_results (administrator, name);
";

/// SQLite-backed result store
#[derive(Debug)]
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open (or create) the database file, creating its parent directory if needed
    pub fn open(path: &Path) -> Result<Self, BatteryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    BatteryError::PersistenceFailure(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened result store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, BatteryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, BatteryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BatteryError> {
        self.conn
            .lock()
            .map_err(|_| BatteryError::PersistenceFailure("result store lock poisoned".to_string()))
    }
}

fn count(conn: &Connection, sql: &str, subject: &SubjectIdentity) -> Result<u64, BatteryError> {
    let raw: i64 = conn.query_row(sql, params![subject.administrator, subject.name], |row| row.get(0))?;
    u64::try_from(raw)
        .map_err(|_| BatteryError::MalformedInput(format!("negative attempt count {}", raw)))
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<SubjectProfile> {
    Ok(SubjectProfile {
        administrator: row.get("administrator")?,
        name: row.get("name")?,
        age: row.get("age")?,
        gender: row.get("gender")?,
        test_date: row.get("test_date")?,
    })
}

fn timestamp_from_row(row: &Row<'_>) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get("recorded_at")?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl ResultStore for SqliteResultStore {
    fn count_attempts(&self, subject: &SubjectIdentity) -> Result<AttemptCounts, BatteryError> {
        let conn = self.lock()?;
        let a_set = count(
            &conn,
            "SELECT COUNT(DISTINCT attempt_id) FROM sequence_memory_results WHERE administrator = ?1 AND name = ?2",
            subject,
        )?;
        let b_set = count(
            &conn,
            "SELECT COUNT(*) FROM digit_span_results WHERE administrator = ?1 AND name = ?2",
            subject,
        )?;
        Ok(AttemptCounts { a_set, b_set })
    }

    fn record_sequence_memory(
        &self,
        profile: &SubjectProfile,
        attempt: &SequenceMemoryAttempt,
    ) -> Result<(), BatteryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let recorded_at = now();
        let attempt_id = attempt.attempt_id.to_string();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sequence_memory_results
                    (attempt_id, administrator, name, age, gender, test_date, test_name,
                     level_name, level_index, correct, wrong, avg_similarity, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for level in &attempt.levels {
                let level_index = i64::try_from(level.level.0).map_err(|_| {
                    BatteryError::MalformedInput(format!("level index {} out of range", level.level.0))
                })?;
                stmt.execute(params![
                    attempt_id,
                    profile.administrator,
                    profile.name,
                    profile.age,
                    profile.gender,
                    profile.test_date,
                    SEQUENCE_MEMORY_TEST_NAME,
                    level.level_name,
                    level_index,
                    level.correct,
                    level.wrong,
                    level.avg_similarity,
                    recorded_at,
                ])?;
            }
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;
        debug!("Stored {} level rows for attempt {}", attempt.levels.len(), attempt_id);
        Ok(())
    }

    fn record_digit_span(
        &self,
        profile: &SubjectProfile,
        outcome: &DigitSpanOutcome,
    ) -> Result<(), BatteryError> {
        let failed_attempts = serde_json::to_string(&outcome.failed_attempts)
            .map_err(|e| BatteryError::MalformedInput(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO digit_span_results
                (administrator, name, age, gender, test_date, test_name, high_score, failed_attempts, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                profile.administrator,
                profile.name,
                profile.age,
                profile.gender,
                profile.test_date,
                DIGIT_SPAN_TEST_NAME,
                outcome.high_score,
                failed_attempts,
                now(),
            ],
        )?;
        Ok(())
    }

    fn record_wisconsin(
        &self,
        profile: &SubjectProfile,
        outcome: &WisconsinOutcome,
    ) -> Result<(), BatteryError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO wisconsin_results
                (administrator, name, age, gender, test_date, test_name, perseverative_responses,
                 trials_to_complete_first_category, failure_to_maintain_set, correct_rate, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                profile.administrator,
                profile.name,
                profile.age,
                profile.gender,
                profile.test_date,
                WISCONSIN_TEST_NAME,
                outcome.perseverative_responses,
                outcome.trials_to_complete_first_category,
                outcome.failure_to_maintain_set,
                outcome.correct_rate,
                now(),
            ],
        )?;
        Ok(())
    }

    fn list_sequence_memory(&self) -> Result<Vec<SequenceMemoryRecord>, BatteryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM sequence_memory_results ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(SequenceMemoryRecord {
                id: row.get("id")?,
                attempt_id: row.get("attempt_id")?,
                profile: profile_from_row(row)?,
                test_name: row.get("test_name")?,
                level_name: row.get("level_name")?,
                level_index: row.get("level_index")?,
                correct: row.get("correct")?,
                wrong: row.get("wrong")?,
                avg_similarity: row.get("avg_similarity")?,
                recorded_at: timestamp_from_row(row)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn list_digit_span(&self) -> Result<Vec<DigitSpanRecord>, BatteryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM digit_span_results ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get("id")?;
            let raw_attempts: Option<String> = row.get("failed_attempts")?;
            let failed_attempts = match raw_attempts {
                Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!("Unreadable failed_attempts on digit span row {}: {}", id, e);
                    Vec::new()
                }),
                None => Vec::new(),
            };
            Ok(DigitSpanRecord {
                id,
                profile: profile_from_row(row)?,
                test_name: row.get("test_name")?,
                outcome: DigitSpanOutcome {
                    high_score: row.get("high_score")?,
                    failed_attempts,
                },
                recorded_at: timestamp_from_row(row)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn list_wisconsin(&self) -> Result<Vec<WisconsinRecord>, BatteryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM wisconsin_results ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(WisconsinRecord {
                id: row.get("id")?,
                profile: profile_from_row(row)?,
                test_name: row.get("test_name")?,
                outcome: WisconsinOutcome {
                    perseverative_responses: row.get("perseverative_responses")?,
                    trials_to_complete_first_category: row.get("trials_to_complete_first_category")?,
                    failure_to_maintain_set: row.get("failure_to_maintain_set")?,
                    correct_rate: row.get("correct_rate")?,
                },
                recorded_at: timestamp_from_row(row)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
