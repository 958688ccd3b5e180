//! Cognitive battery service
//!
//! Administers the sequence-memory (A-Set), digit-span (B-Set) and Wisconsin
//! card-sorting assessments, alternating batteries across a subject's visits
//! and persisting scored results.

pub mod assessment;
pub mod core;
pub mod storage;
pub mod web;
