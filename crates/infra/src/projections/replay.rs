//! Rebuilding the registry read model from the event log.
//!
//! The entity store is disposable: clearing it and replaying every envelope
//! from the start block must land in the same state the live worker reached.

use thiserror::Error;
use tracing::info;

use pkgmg_events::{EventEnvelope, EventSource, ProjectionCursor, ProjectionRunner};
use pkgmg_registry::RegistryEvent;

use crate::event_log::read_all;
use crate::projections::cursor_store::CursorStore;
use crate::projections::registry::{ProjectionError, RegistryProjection};
use crate::read_model::{EntityStore, StoreError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("event source error: {0}")]
    Source(String),
}

/// Summary of a finished rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Envelopes read from the log.
    pub total_events: usize,
    /// Envelopes at or after the start block that were fed to the projection.
    pub replayed_events: usize,
    pub cursor: ProjectionCursor,
}

/// Clear the store and the projection's cursor, then replay `envelopes`.
///
/// Envelopes are applied in log-position order regardless of input order. On
/// success the final cursor is checkpointed so a worker resumes after it.
pub async fn rebuild_from_scratch<S, C>(
    store: S,
    cursors: &C,
    projection_name: &str,
    start_block: u64,
    envelopes: Vec<EventEnvelope<RegistryEvent>>,
) -> Result<ReplayReport, ReplayError>
where
    S: EntityStore,
    C: CursorStore + ?Sized,
{
    let total_events = envelopes.len();
    info!(projection = projection_name, total_events, "rebuilding read model");

    store.clear().await?;
    cursors.clear(projection_name).await?;

    let envelopes: Vec<_> = envelopes
        .into_iter()
        .filter(|e| e.block_number() >= start_block)
        .collect();
    let replayed_events = envelopes.len();

    let (_projection, cursor) =
        ProjectionRunner::rebuild_from_scratch(|| RegistryProjection::new(store), envelopes).await?;
    cursors.save(projection_name, &cursor).await?;

    info!(
        projection = projection_name,
        replayed_events,
        block_number = cursor.block_number(),
        "rebuild complete"
    );
    Ok(ReplayReport {
        total_events,
        replayed_events,
        cursor,
    })
}

/// Drain `source` and rebuild from everything it yields.
pub async fn rebuild_from_source<Src, S, C>(
    source: &mut Src,
    store: S,
    cursors: &C,
    projection_name: &str,
    start_block: u64,
) -> Result<ReplayReport, ReplayError>
where
    Src: EventSource<RegistryEvent>,
    S: EntityStore,
    C: CursorStore + ?Sized,
{
    let envelopes = read_all(source)
        .await
        .map_err(|e| ReplayError::Source(e.to_string()))?;
    rebuild_from_scratch(store, cursors, projection_name, start_block, envelopes).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pkgmg_core::{Address, ReleaseId};
    use pkgmg_events::LogPosition;

    use super::*;
    use crate::event_log::JsonLinesEventSource;
    use crate::projections::cursor_store::InMemoryCursorStore;
    use crate::read_model::InMemoryEntityStore;

    fn owner() -> Address {
        "0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7".parse().unwrap()
    }

    fn env(block: u64, log: u32, ev: RegistryEvent) -> EventEnvelope<RegistryEvent> {
        EventEnvelope::new(LogPosition::new(block, log), ev)
    }

    fn log() -> Vec<EventEnvelope<RegistryEvent>> {
        vec![
            env(12, 0, RegistryEvent::default_version_changed("GenisPackage", "v0.0.2")),
            env(10, 0, RegistryEvent::package_created(owner(), "GenisPackage")),
            env(11, 0, RegistryEvent::package_version_created("GenisPackage", "v0.0.2", "hash2", false)),
            env(10, 1, RegistryEvent::package_version_created("GenisPackage", "v0.0.1", "testDataHash", true)),
        ]
    }

    #[tokio::test]
    async fn rebuild_discards_previous_state() {
        let store = Arc::new(InMemoryEntityStore::new());
        let cursors = InMemoryCursorStore::new();
        store.create_package(&"Stale".into(), &owner()).await.unwrap();
        cursors.save("registry", &ProjectionCursor::new(99, [0])).await.unwrap();

        let report = rebuild_from_scratch(store.clone(), &cursors, "registry", 0, log())
            .await
            .unwrap();

        assert_eq!(report.total_events, 4);
        assert_eq!(report.replayed_events, 4);
        assert_eq!(cursors.load("registry").await.unwrap(), Some(report.cursor.clone()));
        assert_eq!(report.cursor.block_number(), 12);

        assert!(store.get_package(&"Stale".into()).await.unwrap().is_none());
        let pkg = store.get_package(&"GenisPackage".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, Some(ReleaseId::from("v0.0.2GenisPackage")));
    }

    #[tokio::test]
    async fn rebuilding_twice_yields_identical_state() {
        let store = Arc::new(InMemoryEntityStore::new());
        let cursors = InMemoryCursorStore::new();

        rebuild_from_scratch(store.clone(), &cursors, "registry", 0, log()).await.unwrap();
        let first = store.snapshot();
        let mut reversed = log();
        reversed.reverse();
        rebuild_from_scratch(store.clone(), &cursors, "registry", 0, reversed).await.unwrap();

        assert_eq!(store.snapshot(), first);
    }

    #[tokio::test]
    async fn start_block_excludes_earlier_events() {
        let store = Arc::new(InMemoryEntityStore::new());
        let cursors = InMemoryCursorStore::new();

        let report = rebuild_from_scratch(store.clone(), &cursors, "registry", 11, log())
            .await
            .unwrap();

        assert_eq!(report.replayed_events, 2);
        assert!(store.snapshot().packages.is_empty());
        assert!(store.snapshot().releases.is_empty());
    }

    #[tokio::test]
    async fn rebuild_from_json_lines_source() {
        let text = r#"{"blockNumber":1,"logIndex":0,"event":{"type":"PackageCreated","owner":"0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7","pkgName":"a"}}
{"blockNumber":1,"logIndex":1,"event":{"type":"PackageVersionCreated","pkgName":"a","versionName":"1","dataHash":"h","changeDefaultVersion":true}}
"#;
        let mut source = JsonLinesEventSource::<_, RegistryEvent>::new(text.as_bytes());
        let store = Arc::new(InMemoryEntityStore::new());

        let report = rebuild_from_source(&mut source, store.clone(), &InMemoryCursorStore::new(), "registry", 0)
            .await
            .unwrap();

        assert_eq!(report.replayed_events, 2);
        let pkg = store.get_package(&"a".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, Some(ReleaseId::from("1a")));
    }

    #[tokio::test]
    async fn malformed_source_aborts_before_clearing() {
        let store = Arc::new(InMemoryEntityStore::new());
        store.create_package(&"Kept".into(), &owner()).await.unwrap();
        let mut source = JsonLinesEventSource::<_, RegistryEvent>::new("not json\n".as_bytes());

        let result =
            rebuild_from_source(&mut source, store.clone(), &InMemoryCursorStore::new(), "registry", 0).await;

        assert!(matches!(result, Err(ReplayError::Source(_))));
        assert!(store.get_package(&"Kept".into()).await.unwrap().is_some());
    }
}
