//! Projection implementations (read model builders).
//!
//! Projections consume registry events and build the queryable entity state.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event log
//! - **Idempotent**: Safe for at-least-once delivery

pub mod cursor_store;
pub mod registry;
pub mod replay;

pub use cursor_store::{CursorStore, InMemoryCursorStore, PostgresCursorStore};
pub use registry::{DropReason, Outcome, ProjectionError, RegistryProjection};
pub use replay::{ReplayError, ReplayReport, rebuild_from_scratch, rebuild_from_source};
