use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pkgmg_events::{EventSource, LogPosition, Projection, ProjectionCursor, ProjectionRunner, RunOutcome};

use crate::projections::cursor_store::CursorStore;
use crate::read_model::StoreError;
use crate::retry::{IsTransient, RetryConfig, RetryingProjection};

/// Static settings of one projection worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Key under which the cursor is checkpointed.
    pub projection_name: String,
    /// Envelopes from earlier blocks are ignored.
    pub start_block: u64,
    pub retry: RetryConfig,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            projection_name: "registry".to_string(),
            start_block: 0,
            retry: RetryConfig::default(),
        }
    }
}

/// Counters reported when a worker stops cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub applied: u64,
    pub skipped: u64,
    pub below_start_block: u64,
    pub cursor: ProjectionCursor,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("event source failed: {0}")]
    Source(String),

    #[error("projection failed at {position}: {message}")]
    Projection { position: LogPosition, message: String },

    #[error("cursor store failed: {0}")]
    Cursor(#[from] StoreError),

    #[error("worker task failed: {0}")]
    Join(String),
}

/// Requests graceful shutdown of a worker without waiting for it.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

/// Handle to control and join a background worker.
///
/// Dropping the handle and every trigger also stops the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    join: JoinHandle<Result<WorkerReport, WorkerError>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// The event being applied when the request arrives is finished first.
    pub async fn shutdown(self) -> Result<WorkerReport, WorkerError> {
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// A trigger usable after the handle has been moved into `join`.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            sender: self.shutdown.clone(),
        }
    }

    /// Wait for the worker to stop on its own (source exhausted or failure).
    pub async fn join(self) -> Result<WorkerReport, WorkerError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::Join(e.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Single-writer projection worker.
///
/// - Pulls envelopes from an event source, one at a time
/// - Skips envelopes below the start block and redelivered positions
/// - Retries transient projection failures with bounded backoff
/// - Checkpoints the cursor after every applied envelope
/// - Stops on the first permanent failure and reports it
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn the worker as a tokio task.
    pub fn spawn<Src, P, C>(
        options: WorkerOptions,
        source: Src,
        projection: P,
        cursors: C,
    ) -> WorkerHandle
    where
        Src: EventSource<P::Ev> + 'static,
        P: Projection + 'static,
        P::Error: IsTransient,
        C: CursorStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            Self::run(&options, source, projection, cursors, shutdown_rx).await
        });

        WorkerHandle {
            shutdown: Arc::new(shutdown_tx),
            join,
        }
    }

    /// Run the worker loop on the current task until the source ends, shutdown
    /// is requested, or a permanent failure occurs.
    pub async fn run<Src, P, C>(
        options: &WorkerOptions,
        mut source: Src,
        projection: P,
        cursors: C,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WorkerReport, WorkerError>
    where
        Src: EventSource<P::Ev>,
        P: Projection,
        P::Error: IsTransient,
        C: CursorStore,
    {
        let name = options.projection_name.as_str();
        let cursor = cursors.load(name).await?.unwrap_or_default();
        info!(
            worker = name,
            start_block = options.start_block,
            resume_block = cursor.block_number(),
            "projection worker starting"
        );

        let mut runner =
            ProjectionRunner::resume(RetryingProjection::new(projection, options.retry.clone()), cursor);
        let mut report = WorkerReport::default();

        loop {
            if *shutdown.borrow() {
                info!(worker = name, "shutdown requested");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!(worker = name, "shutdown requested");
                    break;
                }
                next = source.next() => next,
            };

            let envelope = match next {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    info!(worker = name, "event source exhausted");
                    break;
                }
                Err(e) => {
                    error!(worker = name, error = %e, "event source failed");
                    return Err(WorkerError::Source(e.to_string()));
                }
            };

            if envelope.block_number() < options.start_block {
                report.below_start_block += 1;
                continue;
            }

            match runner.apply(&envelope).await {
                Ok(RunOutcome::Applied(outcome)) => {
                    report.applied += 1;
                    debug!(worker = name, position = %envelope.position(), ?outcome, "envelope applied");

                    // A lost checkpoint only means re-seeing events after a restart.
                    if let Err(e) = cursors.save(name, runner.cursor()).await {
                        warn!(worker = name, error = %e, "failed to checkpoint cursor");
                    }
                }
                Ok(RunOutcome::Skipped) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(
                        worker = name,
                        position = %envelope.position(),
                        error = %e,
                        "projection failed; stopping worker"
                    );
                    return Err(WorkerError::Projection {
                        position: envelope.position(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report.cursor = runner.cursor().clone();
        info!(
            worker = name,
            applied = report.applied,
            skipped = report.skipped,
            below_start_block = report.below_start_block,
            "projection worker stopped"
        );
        Ok(report)
    }
}
