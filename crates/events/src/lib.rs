//! Event mechanics for the indexer: envelopes, projections, runners and sources.
//!
//! Nothing in this crate knows about packages or releases; the registry domain
//! plugs its event type into these abstractions.

pub mod envelope;
pub mod event;
pub mod projection;
pub mod runner;
pub mod source;

pub use envelope::{EventEnvelope, LogPosition};
pub use event::Event;
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionRunner, RunOutcome};
pub use source::{EventSource, InMemoryEventSender, InMemoryEventSource};
