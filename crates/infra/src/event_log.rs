//! JSON-lines event log reader.
//!
//! The upstream collaborator exports the registry's emitted events as one JSON
//! envelope per line:
//!
//! ```text
//! {"blockNumber":12,"logIndex":0,"transactionHash":"0x…","event":{"type":"PackageCreated","owner":"0x…","pkgName":"GenisPackage"}}
//! ```
//!
//! Blank lines are ignored. A line that does not decode stops the source with
//! its line number; skipping it would silently lose an event.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use pkgmg_events::{EventEnvelope, EventSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Event source reading JSON-lines envelopes from any async reader.
pub struct JsonLinesEventSource<R, E> {
    lines: Lines<BufReader<R>>,
    line_no: usize,
    _event: PhantomData<fn() -> E>,
}

impl<E> JsonLinesEventSource<File, E> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path).await?;
        Ok(Self::new(file))
    }
}

impl<R, E> JsonLinesEventSource<R, E>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line_no: 0,
            _event: PhantomData,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

#[async_trait]
impl<R, E> EventSource<E> for JsonLinesEventSource<R, E>
where
    R: AsyncRead + Unpin + Send,
    E: DeserializeOwned + Send + 'static,
{
    type Error = SourceError;

    async fn next(&mut self) -> Result<Option<EventEnvelope<E>>, SourceError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let envelope = serde_json::from_str(trimmed).map_err(|e| SourceError::Malformed {
                line: self.line_no,
                message: e.to_string(),
            })?;
            return Ok(Some(envelope));
        }
        Ok(None)
    }
}

/// Read a whole log into memory (replay support).
pub async fn read_all<S, E>(source: &mut S) -> Result<Vec<EventEnvelope<E>>, S::Error>
where
    S: EventSource<E>,
{
    let mut out = Vec::new();
    while let Some(env) = source.next().await? {
        out.push(env);
    }
    Ok(out)
}
