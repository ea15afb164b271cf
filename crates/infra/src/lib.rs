//! Infrastructure layer: stores, event log, projections, workers, config.

pub mod config;
pub mod event_log;
pub mod projections;
pub mod read_model;
pub mod retry;
pub mod workers;
