use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::assessment::problem::{compose_practice_problem, Problem};
use crate::assessment::progress::{IssuedProblem, NextStep, SessionProgress};
use crate::assessment::scoring::{aggregate, score};
use crate::assessment::selector::{select_battery, BatteryKind};
use crate::core::config::BatteryConfig;
use crate::core::error::BatteryError;
use crate::core::metrics;
use crate::storage::records::{
    DigitSpanOutcome, DigitSpanRecord, SequenceMemoryAttempt, SequenceMemoryRecord, SubjectProfile,
    WisconsinOutcome, WisconsinRecord,
};
use crate::storage::session::{load, save};
use crate::storage::{ResultStore, SessionStore};

const KEY_PROFILE: &str = "profile";
const KEY_BATTERY: &str = "battery";
const KEY_PROGRESS: &str = "a_set_progress";
const KEY_PRACTICE: &str = "practice_problem";

/// Where the subject goes once the sequence-memory battery is stored
pub const A_SET_NEXT_TARGET: &str = "/wisconsin-test";

/// Result of starting a visit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitStart {
    pub session_id: String,
    pub battery: BatteryKind,
    pub next_target: String,
}

/// Outcome of a practice answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeOutcome {
    Correct,
    Incorrect,
}

/// Outcome of a scored problem request
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemStep {
    Problem(IssuedProblem),
    Completed { next_target: String },
}

/// Binds the battery core to the session and result collaborators.
///
/// Requests for the same session are serialized through a per-session lock;
/// different sessions proceed independently.
#[derive(Debug)]
pub struct BatteryCoordinator {
    config: BatteryConfig,
    admin_password: String,
    sessions: Arc<dyn SessionStore>,
    results: Arc<dyn ResultStore>,
    /// Locks of sessions with a request in flight
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds a session's lock; the map entry goes away with the last holder
struct SessionGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session: String,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own handle left means nobody holds or awaits the lock
        self.locks
            .remove_if(&self.session, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Compare secrets without exiting on the first differing byte
fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

impl BatteryCoordinator {
    pub fn new(
        config: BatteryConfig,
        admin_password: &str,
        sessions: Arc<dyn SessionStore>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            config,
            admin_password: admin_password.to_string(),
            sessions,
            results,
            session_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    async fn lock_session(&self, session: &str) -> SessionGuard<'_> {
        let lock = self
            .session_locks
            .entry(session.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // Built before awaiting so a cancelled wait still releases the entry
        let mut guard = SessionGuard {
            guard: None,
            locks: &self.session_locks,
            session: session.to_string(),
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    async fn require_profile(&self, session: &str) -> Result<SubjectProfile, BatteryError> {
        load(self.sessions.as_ref(), session, KEY_PROFILE)
            .await?
            .ok_or_else(|| BatteryError::InvalidState("no visit has been started".to_string()))
    }

    fn persistence_error(&self, err: BatteryError, what: &str) -> BatteryError {
        if err.is_persistence_failure() {
            metrics::PERSISTENCE_FAILURES.inc();
            error!("Failed to {}: {}", what, err);
        } else {
            warn!("Failed to {}: {}", what, err);
        }
        err
    }

    /// Register a subject, pick their battery, and mint a fresh session
    pub async fn begin_visit(
        &self,
        profile: SubjectProfile,
        previous_session: Option<&str>,
    ) -> Result<VisitStart, BatteryError> {
        let profile = profile.normalized().map_err(|e| {
            warn!("Rejected visit start: {}", e);
            e
        })?;

        if let Some(previous) = previous_session {
            let _guard = self.lock_session(previous).await;
            self.sessions.clear(previous).await?;
            debug!("Cleared previous session {}", previous);
        }

        let battery = select_battery(self.results.as_ref(), &profile.identity())
            .map_err(|e| self.persistence_error(e, "count previous attempts"))?;

        let session_id = Uuid::new_v4().to_string();
        save(self.sessions.as_ref(), &session_id, KEY_PROFILE, &profile).await?;
        save(self.sessions.as_ref(), &session_id, KEY_BATTERY, &battery).await?;
        if battery == BatteryKind::ASet {
            save(self.sessions.as_ref(), &session_id, KEY_PROGRESS, &SessionProgress::start(&self.config)).await?;
        }

        metrics::VISITS.with_label_values(&[battery.label()]).inc();
        info!("Started visit {} for {}/{} on the {}", session_id, profile.administrator, profile.name, battery);

        Ok(VisitStart {
            session_id,
            battery,
            next_target: battery.entry_target().to_string(),
        })
    }

    pub async fn practice_problem(&self, session: &str) -> Result<Problem, BatteryError> {
        let mut rng = StdRng::from_entropy();
        self.practice_problem_with_rng(session, &mut rng).await
    }

    /// Compose and remember a practice problem
    pub async fn practice_problem_with_rng<R: Rng + Send>(
        &self,
        session: &str,
        rng: &mut R,
    ) -> Result<Problem, BatteryError> {
        let _guard = self.lock_session(session).await;
        self.require_profile(session).await?;

        let problem = compose_practice_problem(&self.config, rng)?;
        save(self.sessions.as_ref(), session, KEY_PRACTICE, &problem).await?;
        metrics::PROBLEMS_ISSUED.with_label_values(&["practice"]).inc();
        Ok(problem)
    }

    /// Check a practice answer. The practice problem stays in place for retries.
    pub async fn submit_practice_answer(
        &self,
        session: &str,
        answer: &[usize],
    ) -> Result<PracticeOutcome, BatteryError> {
        let _guard = self.lock_session(session).await;
        let problem: Problem = load(self.sessions.as_ref(), session, KEY_PRACTICE)
            .await?
            .ok_or_else(|| BatteryError::InvalidState("no practice problem has been issued".to_string()))?;
        problem.check_answer_ids(answer)?;

        let result = score(answer, &problem.flash_sequence);
        let outcome = if result.is_correct {
            PracticeOutcome::Correct
        } else {
            PracticeOutcome::Incorrect
        };
        metrics::ANSWERS
            .with_label_values(&["practice", if result.is_correct { "correct" } else { "incorrect" }])
            .inc();
        Ok(outcome)
    }

    pub async fn next_problem(&self, session: &str) -> Result<ProblemStep, BatteryError> {
        let mut rng = StdRng::from_entropy();
        self.next_problem_with_rng(session, &mut rng).await
    }

    /// Issue the next scored problem, or persist the finished battery
    pub async fn next_problem_with_rng<R: Rng + Send>(
        &self,
        session: &str,
        rng: &mut R,
    ) -> Result<ProblemStep, BatteryError> {
        let _guard = self.lock_session(session).await;
        let mut progress: SessionProgress = load(self.sessions.as_ref(), session, KEY_PROGRESS)
            .await?
            .ok_or_else(|| BatteryError::InvalidState("the sequence-memory battery has not been started".to_string()))?;

        match progress.next_problem(&self.config, rng)? {
            NextStep::Problem(issued) => {
                save(self.sessions.as_ref(), session, KEY_PROGRESS, &progress).await?;
                metrics::PROBLEMS_ISSUED.with_label_values(&["scored"]).inc();
                Ok(ProblemStep::Problem(issued))
            }
            NextStep::Completed => {
                self.finish_sequence_memory(session, &progress).await?;
                Ok(ProblemStep::Completed {
                    next_target: A_SET_NEXT_TARGET.to_string(),
                })
            }
        }
    }

    /// Persist all level rows; progress is only discarded once the write succeeded.
    ///
    /// A failed teardown after the commit is logged but not reported: the
    /// attempt is stored, and failing here would invite a second write on retry.
    async fn finish_sequence_memory(
        &self,
        session: &str,
        progress: &SessionProgress,
    ) -> Result<(), BatteryError> {
        let profile = self.require_profile(session).await?;
        let attempt = SequenceMemoryAttempt {
            attempt_id: Uuid::new_v4(),
            levels: aggregate(&progress.score_by_level),
        };

        self.results
            .record_sequence_memory(&profile, &attempt)
            .map_err(|e| self.persistence_error(e, "store sequence-memory results"))?;

        if let Err(e) = self.sessions.remove(session, KEY_PROGRESS).await {
            metrics::PERSISTENCE_FAILURES.inc();
            error!(
                "Stored attempt {} but could not discard progress of session {}: {}",
                attempt.attempt_id, session, e
            );
        }
        metrics::COMPLETIONS.with_label_values(&[BatteryKind::ASet.label()]).inc();
        info!(
            "Stored sequence-memory attempt {} ({} levels) for {}/{}",
            attempt.attempt_id,
            attempt.levels.len(),
            profile.administrator,
            profile.name
        );
        Ok(())
    }

    /// Score an answer to the outstanding scored problem
    pub async fn submit_answer(&self, session: &str, answer: &[usize]) -> Result<(), BatteryError> {
        let _guard = self.lock_session(session).await;
        let mut progress: SessionProgress = load(self.sessions.as_ref(), session, KEY_PROGRESS)
            .await?
            .ok_or_else(|| BatteryError::InvalidState("the sequence-memory battery has not been started".to_string()))?;

        let result = progress.answer_submitted(answer, self.config.problems_per_level)?;
        save(self.sessions.as_ref(), session, KEY_PROGRESS, &progress).await?;

        metrics::ANSWERS
            .with_label_values(&["scored", if result.is_correct { "correct" } else { "incorrect" }])
            .inc();
        metrics::SIMILARITY.observe(result.similarity);
        debug!(
            "Session {} answer scored correct={} similarity={:.4}",
            session, result.is_correct, result.similarity
        );
        Ok(())
    }

    /// Store the digit-span metrics reported by the subject's device
    pub async fn record_digit_span(
        &self,
        session: &str,
        payload: serde_json::Value,
    ) -> Result<(), BatteryError> {
        let _guard = self.lock_session(session).await;
        let profile = self.require_profile(session).await?;
        let outcome: DigitSpanOutcome = serde_json::from_value(payload).map_err(|e| {
            warn!("Rejected digit span result: {}", e);
            BatteryError::MalformedInput(format!("invalid digit span result: {}", e))
        })?;

        self.results
            .record_digit_span(&profile, &outcome)
            .map_err(|e| self.persistence_error(e, "store digit span result"))?;
        metrics::COMPLETIONS.with_label_values(&[BatteryKind::BSet.label()]).inc();
        info!("Stored digit span result for {}/{} (high score {})", profile.administrator, profile.name, outcome.high_score);
        Ok(())
    }

    /// Store the Wisconsin card-sorting metrics reported by the subject's device
    pub async fn record_wisconsin(
        &self,
        session: &str,
        payload: serde_json::Value,
    ) -> Result<(), BatteryError> {
        let _guard = self.lock_session(session).await;
        let profile = self.require_profile(session).await?;
        let outcome: WisconsinOutcome = serde_json::from_value(payload).map_err(|e| {
            warn!("Rejected Wisconsin result: {}", e);
            BatteryError::MalformedInput(format!("invalid Wisconsin result: {}", e))
        })?;
        outcome.validate()?;

        self.results
            .record_wisconsin(&profile, &outcome)
            .map_err(|e| self.persistence_error(e, "store Wisconsin result"))?;
        metrics::COMPLETIONS.with_label_values(&["wisconsin"]).inc();
        info!("Stored Wisconsin result for {}/{}", profile.administrator, profile.name);
        Ok(())
    }

    fn authorize(&self, password: Option<&str>) -> Result<(), BatteryError> {
        if password.map_or(false, |given| secrets_match(given, &self.admin_password)) {
            Ok(())
        } else {
            warn!("Rejected result listing with a wrong admin password");
            Err(BatteryError::Unauthorized("admin password does not match".to_string()))
        }
    }

    pub fn list_sequence_memory(&self, password: Option<&str>) -> Result<Vec<SequenceMemoryRecord>, BatteryError> {
        self.authorize(password)?;
        self.results
            .list_sequence_memory()
            .map_err(|e| self.persistence_error(e, "list sequence-memory results"))
    }

    pub fn list_digit_span(&self, password: Option<&str>) -> Result<Vec<DigitSpanRecord>, BatteryError> {
        self.authorize(password)?;
        self.results
            .list_digit_span()
            .map_err(|e| self.persistence_error(e, "list digit span results"))
    }

    pub fn list_wisconsin(&self, password: Option<&str>) -> Result<Vec<WisconsinRecord>, BatteryError> {
        self.authorize(password)?;
        self.results
            .list_wisconsin()
            .map_err(|e| self.persistence_error(e, "list Wisconsin results"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LevelDefinition;
    use crate::storage::records::AttemptCounts;
    use crate::storage::{MemorySessionStore, MockResultStore, SqliteResultStore};
    use serde_json::json;

    fn profile() -> SubjectProfile {
        SubjectProfile {
            administrator: "kim".to_string(),
            name: "Lee".to_string(),
            age: 29,
            gender: "m".to_string(),
            test_date: "2026-10-19".to_string(),
        }
    }

    fn small_config() -> BatteryConfig {
        BatteryConfig {
            levels: vec![LevelDefinition::new("Level 1", 5, 3), LevelDefinition::new("Level 2", 6, 4)],
            problems_per_level: 2,
            ..BatteryConfig::default()
        }
    }

    fn coordinator(store: Arc<dyn ResultStore>) -> BatteryCoordinator {
        BatteryCoordinator::new(small_config(), "secret", Arc::new(MemorySessionStore::new(16)), store)
    }

    fn counts_store(counts: AttemptCounts) -> MockResultStore {
        let mut store = MockResultStore::new();
        store.expect_count_attempts().returning(move |_| Ok(counts));
        store
    }

    async fn run_battery(coord: &BatteryCoordinator, session: &str, rng: &mut StdRng) -> ProblemStep {
        loop {
            match coord.next_problem_with_rng(session, rng).await.unwrap() {
                ProblemStep::Problem(issued) => {
                    coord.submit_answer(session, &issued.problem.flash_sequence).await.unwrap();
                }
                completed => return completed,
            }
        }
    }

    #[tokio::test]
    async fn test_visit_alternates_by_history() {
        let coord = coordinator(Arc::new(counts_store(AttemptCounts { a_set: 2, b_set: 2 })));
        let visit = coord.begin_visit(profile(), None).await.unwrap();
        assert_eq!(visit.battery, BatteryKind::ASet);
        assert_eq!(visit.next_target, "/a-set/practice");

        let coord = coordinator(Arc::new(counts_store(AttemptCounts { a_set: 2, b_set: 3 })));
        let visit = coord.begin_visit(profile(), None).await.unwrap();
        assert_eq!(visit.battery, BatteryKind::BSet);
        // No sequence-memory progress for a digit span visit
        assert!(matches!(
            coord.next_problem(&visit.session_id).await,
            Err(BatteryError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_profile_rejected_before_store_access() {
        // No expectations: any store call would panic
        let coord = coordinator(Arc::new(MockResultStore::new()));
        let mut bad = profile();
        bad.name = " ".to_string();
        assert!(matches!(
            coord.begin_visit(bad, None).await,
            Err(BatteryError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_problem_before_start_is_invalid() {
        let coord = coordinator(Arc::new(MockResultStore::new()));
        assert!(matches!(coord.next_problem("unknown").await, Err(BatteryError::InvalidState(_))));
        assert!(matches!(coord.submit_answer("unknown", &[0]).await, Err(BatteryError::InvalidState(_))));
        assert!(matches!(coord.practice_problem("unknown").await, Err(BatteryError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_practice_round() {
        let coord = coordinator(Arc::new(counts_store(AttemptCounts::default())));
        let visit = coord.begin_visit(profile(), None).await.unwrap();
        let session = visit.session_id.as_str();

        assert!(matches!(
            coord.submit_practice_answer(session, &[0, 1]).await,
            Err(BatteryError::InvalidState(_))
        ));

        let mut rng = StdRng::seed_from_u64(8);
        let problem = coord.practice_problem_with_rng(session, &mut rng).await.unwrap();
        assert_eq!(problem.regions.len(), 3);

        let mut wrong = problem.flash_sequence.clone();
        wrong.reverse();
        assert_eq!(coord.submit_practice_answer(session, &wrong).await.unwrap(), PracticeOutcome::Incorrect);
        // Retry against the same problem
        assert_eq!(
            coord.submit_practice_answer(session, &problem.flash_sequence).await.unwrap(),
            PracticeOutcome::Correct
        );
        assert!(matches!(
            coord.submit_practice_answer(session, &[7]).await,
            Err(BatteryError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_full_battery_persists_once() {
        let mut store = counts_store(AttemptCounts::default());
        store
            .expect_record_sequence_memory()
            .times(1)
            .withf(|profile, attempt| {
                profile.name == "Lee"
                    && attempt.levels.len() == 2
                    && attempt.levels.iter().all(|l| l.correct == 2 && l.wrong == 0 && l.avg_similarity == 1.0)
            })
            .returning(|_, _| Ok(()));
        let coord = coordinator(Arc::new(store));
        let visit = coord.begin_visit(profile(), None).await.unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let step = run_battery(&coord, &visit.session_id, &mut rng).await;
        assert_eq!(step, ProblemStep::Completed { next_target: A_SET_NEXT_TARGET.to_string() });

        // Progress torn down after the write
        assert!(matches!(
            coord.next_problem(&visit.session_id).await,
            Err(BatteryError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_progress_for_retry() {
        let mut store = counts_store(AttemptCounts::default());
        let mut seq = mockall::Sequence::new();
        store
            .expect_record_sequence_memory()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(BatteryError::PersistenceFailure("database is locked".to_string())));
        store
            .expect_record_sequence_memory()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        let coord = coordinator(Arc::new(store));
        let visit = coord.begin_visit(profile(), None).await.unwrap();
        let session = visit.session_id.as_str();

        let mut rng = StdRng::seed_from_u64(10);
        loop {
            match coord.next_problem_with_rng(session, &mut rng).await {
                Ok(ProblemStep::Problem(issued)) => {
                    coord.submit_answer(session, &issued.problem.flash_sequence).await.unwrap();
                }
                Err(BatteryError::PersistenceFailure(_)) => break,
                other => panic!("unexpected step: {:?}", other),
            }
        }

        assert_eq!(
            coord.next_problem(session).await.unwrap(),
            ProblemStep::Completed { next_target: A_SET_NEXT_TARGET.to_string() }
        );
    }

    #[tokio::test]
    async fn test_new_visit_clears_previous_session() {
        let coord = coordinator(Arc::new(counts_store(AttemptCounts::default())));
        let first = coord.begin_visit(profile(), None).await.unwrap();
        let second = coord.begin_visit(profile(), Some(&first.session_id)).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert!(matches!(
            coord.practice_problem(&first.session_id).await,
            Err(BatteryError::InvalidState(_))
        ));
        assert!(coord.practice_problem(&second.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_end_to_end_alternation() {
        let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::open_in_memory().unwrap());
        let coord = coordinator(store);
        let mut rng = StdRng::seed_from_u64(11);

        let visit = coord.begin_visit(profile(), None).await.unwrap();
        assert_eq!(visit.battery, BatteryKind::ASet);
        run_battery(&coord, &visit.session_id, &mut rng).await;
        coord
            .record_wisconsin(
                &visit.session_id,
                json!({
                    "perseverativeResponses": 3,
                    "trialsToCompleteFirstCategory": 11,
                    "failureToMaintainSet": 0,
                    "correctRate": 0.9
                }),
            )
            .await
            .unwrap();

        let visit = coord.begin_visit(profile(), Some(&visit.session_id)).await.unwrap();
        assert_eq!(visit.battery, BatteryKind::BSet);
        coord
            .record_digit_span(&visit.session_id, json!({"highScore": 7, "failedAttempts": [[4, 1, 9]]}))
            .await
            .unwrap();

        let visit = coord.begin_visit(profile(), Some(&visit.session_id)).await.unwrap();
        assert_eq!(visit.battery, BatteryKind::ASet);

        assert_eq!(coord.list_sequence_memory(Some("secret")).unwrap().len(), 2);
        assert_eq!(coord.list_digit_span(Some("secret")).unwrap().len(), 1);
        assert_eq!(coord.list_wisconsin(Some("secret")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_result_payload_validation() {
        let coord = coordinator(Arc::new(counts_store(AttemptCounts::default())));
        let visit = coord.begin_visit(profile(), None).await.unwrap();
        assert!(matches!(
            coord.record_digit_span(&visit.session_id, json!({"highScore": 5})).await,
            Err(BatteryError::MalformedInput(_))
        ));
        assert!(matches!(
            coord
                .record_wisconsin(
                    &visit.session_id,
                    json!({
                        "perseverativeResponses": 3,
                        "trialsToCompleteFirstCategory": 11,
                        "failureToMaintainSet": 0,
                        "correctRate": -1.0
                    })
                )
                .await,
            Err(BatteryError::MalformedInput(_))
        ));
        assert!(matches!(
            coord.record_digit_span("unknown", json!({"highScore": 5, "failedAttempts": []})).await,
            Err(BatteryError::InvalidState(_))
        ));
    }

    #[test]
    fn test_listing_requires_password() {
        let coord = coordinator(Arc::new(MockResultStore::new()));
        assert!(matches!(coord.list_digit_span(None), Err(BatteryError::Unauthorized(_))));
        assert!(matches!(coord.list_wisconsin(Some("wrong")), Err(BatteryError::Unauthorized(_))));
        assert!(matches!(coord.list_wisconsin(Some("secre")), Err(BatteryError::Unauthorized(_))));
        assert!(matches!(coord.list_wisconsin(Some("secret!")), Err(BatteryError::Unauthorized(_))));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("secret", "secret"));
        assert!(!secrets_match("secreT", "secret"));
        assert!(!secrets_match("", "secret"));
        assert!(secrets_match("", ""));
    }

    #[tokio::test]
    async fn test_session_locks_do_not_outlive_requests() {
        let sessions = Arc::new(MemorySessionStore::new(2));
        let coord = BatteryCoordinator::new(
            small_config(),
            "secret",
            sessions.clone(),
            Arc::new(counts_store(AttemptCounts::default())),
        );

        for i in 0..1000 {
            let session = format!("bogus-{}", i);
            assert!(matches!(coord.next_problem(&session).await, Err(BatteryError::InvalidState(_))));
        }
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..50 {
            let visit = coord.begin_visit(profile(), None).await.unwrap();
            coord.practice_problem_with_rng(&visit.session_id, &mut rng).await.unwrap();
        }

        assert_eq!(sessions.len().await, 2);
        assert!(coord.session_locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_lock() {
        let coord = Arc::new(coordinator(Arc::new(counts_store(AttemptCounts::default()))));
        let visit = coord.begin_visit(profile(), None).await.unwrap();

        let guard = coord.lock_session(&visit.session_id).await;
        let waiter = {
            let coord = coord.clone();
            let session = visit.session_id.clone();
            tokio::spawn(async move { coord.practice_problem(&session).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(coord.session_locks.len(), 1);

        drop(guard);
        assert!(waiter.await.unwrap().is_ok());
        assert!(coord.session_locks.is_empty());
    }

    /// Session store whose key removal always fails
    #[derive(Debug)]
    struct StuckSessionStore {
        inner: MemorySessionStore,
    }

    #[async_trait::async_trait]
    impl SessionStore for StuckSessionStore {
        async fn get(&self, session: &str, key: &str) -> Result<Option<serde_json::Value>, BatteryError> {
            self.inner.get(session, key).await
        }

        async fn set(&self, session: &str, key: &str, value: serde_json::Value) -> Result<(), BatteryError> {
            self.inner.set(session, key, value).await
        }

        async fn remove(&self, _session: &str, _key: &str) -> Result<(), BatteryError> {
            Err(BatteryError::PersistenceFailure("session backend unavailable".to_string()))
        }

        async fn clear(&self, session: &str) -> Result<(), BatteryError> {
            self.inner.clear(session).await
        }
    }

    #[tokio::test]
    async fn test_stored_attempt_completes_when_teardown_fails() {
        let mut store = counts_store(AttemptCounts::default());
        store.expect_record_sequence_memory().times(1).returning(|_, _| Ok(()));
        let coord = BatteryCoordinator::new(
            small_config(),
            "secret",
            Arc::new(StuckSessionStore { inner: MemorySessionStore::new(4) }),
            Arc::new(store),
        );
        let visit = coord.begin_visit(profile(), None).await.unwrap();

        let mut rng = StdRng::seed_from_u64(13);
        let step = run_battery(&coord, &visit.session_id, &mut rng).await;
        assert_eq!(step, ProblemStep::Completed { next_target: A_SET_NEXT_TARGET.to_string() });
    }

    #[tokio::test]
    async fn test_unreadable_counts_are_not_persistence_failures() {
        let mut store = MockResultStore::new();
        store
            .expect_count_attempts()
            .returning(|_| Err(BatteryError::MalformedInput("count is not an integer".to_string())));
        let coord = coordinator(Arc::new(store));
        assert!(matches!(
            coord.begin_visit(profile(), None).await,
            Err(BatteryError::MalformedInput(_))
        ));
    }
}
