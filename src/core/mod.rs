pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
