use async_trait::async_trait;

use crate::{Event, EventEnvelope};

/// A projection builds a read model from an ordered event log.
///
/// Projections transform upstream events into queryable state. The read model is
/// derived: it can be cleared and rebuilt by replaying the log from the start
/// block, and replaying the same log always yields the same state.
///
/// ## Idempotency
///
/// Projections must be **safe to re-invoke** with an event they have already
/// applied, fully or partially. This enables:
/// - **At-least-once delivery**: the source may redeliver events
/// - **Retry**: a store failure halfway through a handler is retried from the top
/// - **Crash recovery**: a restart resumes from the checkpoint block and re-sees
///   part of it
///
/// `ProjectionRunner` additionally skips exact redeliveries by log position, but
/// projections should not rely on that for correctness.
///
/// ## Persistence
///
/// This trait doesn't define where the read model lives; implementations receive
/// their store handle at construction.
#[async_trait]
pub trait Projection: Send + Sync {
    type Ev: Event;

    /// What applying one event did (applied, ignored as duplicate, dropped, ...).
    type Outcome: core::fmt::Debug + Send;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply a single event to the read model.
    ///
    /// Recoverable situations (duplicates, out-of-order references) are reported
    /// through `Outcome`; `Err` is reserved for failures the operator must see.
    async fn apply(
        &self,
        envelope: &EventEnvelope<Self::Ev>,
    ) -> Result<Self::Outcome, Self::Error>;
}
