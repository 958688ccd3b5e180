//! Thin JSON boundary over the battery coordinator

pub mod handlers;
pub mod models;
pub mod server;
