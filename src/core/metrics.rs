//! Prometheus instrumentation for the battery flow
//!
//! All collectors live in a dedicated registry so the exposition endpoint only
//! reports what this service owns.

use log::error;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static::lazy_static! {
    /// Registry holding every battery collector
    pub static ref REGISTRY: Registry = Registry::new();

    /// Visits started, by selected battery
    pub static ref VISITS: IntCounterVec = IntCounterVec::new(
        Opts::new("battery_visits_total", "Visits started, by selected battery"),
        &["battery"],
    ).expect("valid metric definition");

    /// Problems handed out, by kind (practice or scored)
    pub static ref PROBLEMS_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("battery_problems_issued_total", "Problems issued to subjects"),
        &["kind"],
    ).expect("valid metric definition");

    /// Answers scored, by kind and outcome
    pub static ref ANSWERS: IntCounterVec = IntCounterVec::new(
        Opts::new("battery_answers_total", "Answers scored"),
        &["kind", "outcome"],
    ).expect("valid metric definition");

    /// Completed batteries persisted, by battery
    pub static ref COMPLETIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("battery_completions_total", "Battery attempts persisted"),
        &["battery"],
    ).expect("valid metric definition");

    /// Writes or reads rejected by the result store
    pub static ref PERSISTENCE_FAILURES: IntCounter = IntCounter::new(
        "battery_persistence_failures_total",
        "Result store operations that failed",
    ).expect("valid metric definition");

    /// Distribution of per-answer similarity
    pub static ref SIMILARITY: Histogram = Histogram::with_opts(
        HistogramOpts::new("battery_answer_similarity", "Similarity of scored answers")
            .buckets(vec![0.0, 0.25, 0.5, 0.75, 1.0]),
    ).expect("valid metric definition");
}

/// Register all collectors. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(VISITS.clone()),
        Box::new(PROBLEMS_ISSUED.clone()),
        Box::new(ANSWERS.clone()),
        Box::new(COMPLETIONS.clone()),
        Box::new(PERSISTENCE_FAILURES.clone()),
        Box::new(SIMILARITY.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => error!("Failed to register metric: {}", e),
        }
    }
}

/// Render the registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
