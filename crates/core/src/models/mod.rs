//! Telemetry data model shared by the engine and its delivery ports.

pub mod engagement;
pub mod event;
