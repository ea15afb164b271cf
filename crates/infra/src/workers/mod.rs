//! Background workers driving projections from an event source.

pub mod projection_worker;

pub use projection_worker::{
    ProjectionWorker, ShutdownTrigger, WorkerError, WorkerHandle, WorkerOptions, WorkerReport,
};
