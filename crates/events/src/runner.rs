//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; the upstream log is the source of truth.
//! This module provides deterministic replay and position tracking without
//! making storage assumptions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EventEnvelope, LogPosition, Projection};

/// Tracks projection progress through the log.
///
/// Blocks are applied in ascending order, but the events inside one block may be
/// delivered in any order, so the cursor remembers every log index applied in
/// the highest block seen. Anything at or before that frontier has been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCursor {
    block_number: u64,
    applied_log_indices: BTreeSet<u32>,
}

impl ProjectionCursor {
    pub fn new(block_number: u64, applied_log_indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            block_number,
            applied_log_indices: applied_log_indices.into_iter().collect(),
        }
    }

    /// Highest block any applied event belongs to.
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn applied_log_indices(&self) -> &BTreeSet<u32> {
        &self.applied_log_indices
    }

    /// Whether an event at `position` has already been applied.
    pub fn has_applied(&self, position: LogPosition) -> bool {
        match position.block_number.cmp(&self.block_number) {
            core::cmp::Ordering::Less => true,
            core::cmp::Ordering::Equal => self.applied_log_indices.contains(&position.log_index),
            core::cmp::Ordering::Greater => false,
        }
    }

    /// Mark `position` as applied, moving the frontier forward if needed.
    pub fn record(&mut self, position: LogPosition) {
        if position.block_number > self.block_number {
            self.block_number = position.block_number;
            self.applied_log_indices.clear();
        }
        if position.block_number == self.block_number {
            self.applied_log_indices.insert(position.log_index);
        }
    }
}

/// Result of offering one envelope to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<O> {
    /// The projection handled the envelope.
    Applied(O),
    /// The envelope's position was already applied; the projection never saw it.
    Skipped,
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: ProjectionCursor,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: ProjectionCursor::default(),
        }
    }

    /// Create a runner that continues from a saved checkpoint.
    pub fn resume(projection: P, cursor: ProjectionCursor) -> Self {
        Self { projection, cursor }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Current cursor for this projection.
    pub fn cursor(&self) -> &ProjectionCursor {
        &self.cursor
    }

    /// Apply a single envelope unless its position was already applied.
    ///
    /// The cursor only advances when the projection returns `Ok`, so a failed
    /// envelope is offered to the projection again on redelivery.
    pub async fn apply(
        &mut self,
        envelope: &EventEnvelope<P::Ev>,
    ) -> Result<RunOutcome<P::Outcome>, P::Error> {
        let position = envelope.position();
        if self.cursor.has_applied(position) {
            debug!(%position, frontier = self.cursor.block_number, "skipping redelivered event");
            return Ok(RunOutcome::Skipped);
        }

        let outcome = self.projection.apply(envelope).await?;
        self.cursor.record(position);
        Ok(RunOutcome::Applied(outcome))
    }

    /// Apply many envelopes in order.
    pub async fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<Vec<RunOutcome<P::Outcome>>, P::Error>
    where
        P::Ev: 'a,
    {
        let mut outcomes = Vec::new();
        for env in envelopes {
            outcomes.push(self.apply(env).await?);
        }
        Ok(outcomes)
    }

    /// Rebuild a projection from scratch by replaying the full log.
    ///
    /// Envelopes are sorted by log position first, so the result does not depend
    /// on the order they were collected in. The factory must return a projection
    /// over an empty read model.
    pub async fn rebuild_from_scratch(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = EventEnvelope<P::Ev>>,
    ) -> Result<(P, ProjectionCursor), P::Error> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| e.position());

        let mut runner = ProjectionRunner::new(factory());
        runner.run(envs.iter()).await?;
        Ok((runner.projection, runner.cursor))
    }
}
