use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of an event in the upstream log.
///
/// Ordered by block first, then by the log index inside the block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl LogPosition {
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl core::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// Envelope for an event, carrying where in the upstream log it was emitted.
///
/// This is the unit the event source delivers and the runner applies.
///
/// Notes:
/// - `position` identifies the event; a redelivery carries the same position.
/// - Within one block the source may deliver events in any order.
/// - `payload` is the typed domain event (serialized as `event`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    #[serde(flatten)]
    position: LogPosition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "event")]
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(position: LogPosition, payload: E) -> Self {
        Self {
            position,
            transaction_hash: None,
            block_timestamp: None,
            payload,
        }
    }

    pub fn with_transaction_hash(mut self, hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(hash.into());
        self
    }

    pub fn with_block_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.block_timestamp = Some(at);
        self
    }

    pub fn position(&self) -> LogPosition {
        self.position
    }

    pub fn block_number(&self) -> u64 {
        self.position.block_number
    }

    pub fn log_index(&self) -> u32 {
        self.position.log_index
    }

    pub fn transaction_hash(&self) -> Option<&str> {
        self.transaction_hash.as_deref()
    }

    pub fn block_timestamp(&self) -> Option<DateTime<Utc>> {
        self.block_timestamp
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
