//! Tally Core — event model, configuration, error taxonomy and PII sanitizers
//! shared by the analytics engine.

pub mod config;
pub mod error;
pub mod models;
pub mod sanitize;
