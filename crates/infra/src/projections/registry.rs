//! Registry projection: folds registry events into packages and releases.
//!
//! The projection holds no state of its own; everything lives in the injected
//! entity store, so the result of applying an event depends only on the store
//! contents and the event.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use pkgmg_core::{PackageName, ReleaseId};
use pkgmg_events::{EventEnvelope, Projection};
use pkgmg_registry::{
    DefaultVersionChanged, PackageCreated, PackageVersionCreated, RegistryEvent, Release,
};

use crate::read_model::{EntityStore, StoreError};
use crate::retry::IsTransient;

/// Why an event was dropped without touching the store.
///
/// Both cases mean the upstream log delivered a reference before (or without)
/// the entity it refers to. The projection cannot repair that locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    PackageNotFound(PackageName),
    ReleaseNotFound(ReleaseId),
}

/// What applying one registry event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The store changed.
    Applied,
    /// The event had already been applied; nothing new was written.
    Duplicate,
    /// The event was dropped with a diagnostic.
    Dropped(DropReason),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A redelivered creation event disagrees with what is already stored.
    #[error("integrity mismatch on {entity} {key}: {detail}")]
    IntegrityMismatch {
        entity: &'static str,
        key: String,
        detail: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProjectionError {
    fn mismatch(entity: &'static str, key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IntegrityMismatch {
            entity,
            key: key.into(),
            detail: detail.into(),
        }
    }
}

impl IsTransient for ProjectionError {
    fn is_transient(&self) -> bool {
        match self {
            ProjectionError::Store(e) => e.is_transient(),
            ProjectionError::IntegrityMismatch { .. } => false,
        }
    }
}

/// Projection engine for registry events.
#[derive(Debug, Clone)]
pub struct RegistryProjection<S> {
    store: S,
}

impl<S> RegistryProjection<S>
where
    S: EntityStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one event to the store.
    ///
    /// Safe to call again with the same event, including after a failure part
    /// way through. Does not deduplicate by log position: a stale
    /// `PackageVersionCreated` with `changeDefaultVersion` re-points the
    /// default, so live callers go through `ProjectionRunner`.
    pub async fn handle(&self, event: &RegistryEvent) -> Result<Outcome, ProjectionError> {
        match event {
            RegistryEvent::PackageCreated(e) => self.on_package_created(e).await,
            RegistryEvent::PackageVersionCreated(e) => self.on_version_created(e).await,
            RegistryEvent::DefaultVersionChanged(e) => self.on_default_version_changed(e).await,
        }
    }

    async fn on_package_created(&self, e: &PackageCreated) -> Result<Outcome, ProjectionError> {
        match self.store.create_package(&e.pkg_name, &e.owner).await {
            Ok(()) => {
                info!(package = %e.pkg_name, owner = %e.owner, "package created");
                Ok(Outcome::Applied)
            }
            Err(StoreError::PackageAlreadyExists(_)) => {
                let existing = self
                    .store
                    .get_package(&e.pkg_name)
                    .await?
                    .ok_or_else(|| StoreError::PackageNotFound(e.pkg_name.clone()))?;

                if existing.owner != e.owner {
                    error!(
                        package = %e.pkg_name,
                        stored_owner = %existing.owner,
                        event_owner = %e.owner,
                        "package re-created with a different owner"
                    );
                    return Err(ProjectionError::mismatch(
                        "package",
                        e.pkg_name.as_str(),
                        format!("owner {} != {}", existing.owner, e.owner),
                    ));
                }

                debug!(package = %e.pkg_name, "duplicate PackageCreated ignored");
                Ok(Outcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn on_version_created(
        &self,
        e: &PackageVersionCreated,
    ) -> Result<Outcome, ProjectionError> {
        if self.store.get_package(&e.pkg_name).await?.is_none() {
            warn!(
                package = %e.pkg_name,
                version = %e.version_name,
                "package does not exist; dropping PackageVersionCreated"
            );
            return Ok(Outcome::Dropped(DropReason::PackageNotFound(e.pkg_name.clone())));
        }

        let release = Release::new(e.version_name.clone(), e.pkg_name.clone(), e.data_hash.clone());

        let duplicate = match self.store.create_release(&release).await {
            Ok(()) => {
                info!(package = %e.pkg_name, release = %release.id, "release created");
                false
            }
            Err(StoreError::ReleaseAlreadyExists(_)) => {
                let existing = self
                    .store
                    .get_release(&release.id)
                    .await?
                    .ok_or_else(|| StoreError::ReleaseNotFound(release.id.clone()))?;

                if let Some(detail) = existing.diff(&release) {
                    error!(release = %release.id, %detail, "release re-created with a different payload");
                    return Err(ProjectionError::mismatch("release", release.id.as_str(), detail));
                }

                debug!(release = %release.id, "duplicate PackageVersionCreated");
                true
            }
            Err(StoreError::PackageNotFound(_)) => {
                warn!(package = %e.pkg_name, "package vanished; dropping PackageVersionCreated");
                return Ok(Outcome::Dropped(DropReason::PackageNotFound(e.pkg_name.clone())));
            }
            Err(err) => return Err(err.into()),
        };

        // Only after the release is stored, so the pointer never dangles. A
        // duplicate still re-points: an earlier attempt may have stopped between
        // the two writes.
        if e.change_default_version {
            self.store.set_default_version(&e.pkg_name, &release.id).await?;
            debug!(package = %e.pkg_name, release = %release.id, "default version set");
        }

        Ok(if duplicate {
            Outcome::Duplicate
        } else {
            Outcome::Applied
        })
    }

    async fn on_default_version_changed(
        &self,
        e: &DefaultVersionChanged,
    ) -> Result<Outcome, ProjectionError> {
        let Some(package) = self.store.get_package(&e.pkg_name).await? else {
            warn!(
                package = %e.pkg_name,
                version = %e.version_name,
                "package does not exist; dropping DefaultVersionChanged"
            );
            return Ok(Outcome::Dropped(DropReason::PackageNotFound(e.pkg_name.clone())));
        };

        let release_id = e.release_id();
        let Some(release) = self.store.get_release(&release_id).await? else {
            warn!(
                package = %e.pkg_name,
                release = %release_id,
                "release does not exist; dropping DefaultVersionChanged"
            );
            return Ok(Outcome::Dropped(DropReason::ReleaseNotFound(release_id)));
        };

        // Only reachable through an id collision; the package has no such release.
        if release.package != e.pkg_name {
            warn!(
                package = %e.pkg_name,
                release = %release_id,
                owner = %release.package,
                "release belongs to another package; dropping DefaultVersionChanged"
            );
            return Ok(Outcome::Dropped(DropReason::ReleaseNotFound(release_id)));
        }

        if package.default_version.as_ref() == Some(&release_id) {
            debug!(package = %e.pkg_name, release = %release_id, "default version already set");
            return Ok(Outcome::Duplicate);
        }

        self.store.set_default_version(&e.pkg_name, &release_id).await?;
        info!(package = %e.pkg_name, release = %release_id, "default version changed");
        Ok(Outcome::Applied)
    }
}

#[async_trait]
impl<S> Projection for RegistryProjection<S>
where
    S: EntityStore,
{
    type Ev = RegistryEvent;
    type Outcome = Outcome;
    type Error = ProjectionError;

    async fn apply(&self, envelope: &EventEnvelope<RegistryEvent>) -> Result<Outcome, ProjectionError> {
        let outcome = self.handle(envelope.payload()).await?;
        debug!(
            position = %envelope.position(),
            event_type = pkgmg_events::Event::event_type(envelope.payload()),
            ?outcome,
            "registry event applied"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pkgmg_core::Address;
    use pkgmg_registry::Package;

    use super::*;
    use crate::read_model::{InMemoryEntityStore, Snapshot};

    fn owner() -> Address {
        "0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7".parse().unwrap()
    }

    fn other_owner() -> Address {
        "0x0000000000000000000000000000000000000001".parse().unwrap()
    }

    fn setup() -> (Arc<InMemoryEntityStore>, RegistryProjection<Arc<InMemoryEntityStore>>) {
        let store = Arc::new(InMemoryEntityStore::new());
        (store.clone(), RegistryProjection::new(store))
    }

    async fn genis_with_first_release(engine: &RegistryProjection<Arc<InMemoryEntityStore>>) {
        engine
            .handle(&RegistryEvent::package_created(owner(), "GenisPackage"))
            .await
            .unwrap();
        engine
            .handle(&RegistryEvent::package_version_created(
                "GenisPackage",
                "v0.0.1",
                "testDataHash",
                true,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn package_created_twice_equals_once() {
        let (store, engine) = setup();
        let ev = RegistryEvent::package_created(owner(), "GenisPackage");

        assert_eq!(engine.handle(&ev).await.unwrap(), Outcome::Applied);
        let once = store.snapshot();
        assert_eq!(engine.handle(&ev).await.unwrap(), Outcome::Duplicate);

        assert_eq!(store.snapshot(), once);
        assert_eq!(
            once.packages,
            vec![Package {
                name: "GenisPackage".into(),
                owner: owner(),
                default_version: None,
            }]
        );
    }

    #[tokio::test]
    async fn package_recreated_by_other_owner_is_mismatch() {
        let (store, engine) = setup();
        engine
            .handle(&RegistryEvent::package_created(owner(), "GenisPackage"))
            .await
            .unwrap();
        let before = store.snapshot();

        let err = engine
            .handle(&RegistryEvent::package_created(other_owner(), "GenisPackage"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProjectionError::IntegrityMismatch { entity: "package", .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn orphan_release_is_dropped() {
        let (store, engine) = setup();

        let outcome = engine
            .handle(&RegistryEvent::package_version_created("ghost", "v1", "hash", false))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Dropped(DropReason::PackageNotFound("ghost".into())));
        assert_eq!(store.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn version_created_with_default_sets_pointer() {
        let (store, engine) = setup();
        genis_with_first_release(&engine).await;

        let pkg = store.get_package(&"GenisPackage".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, Some(ReleaseId::from("v0.0.1GenisPackage")));

        let release = store.get_release(&"v0.0.1GenisPackage".into()).await.unwrap().unwrap();
        assert_eq!(release.version.as_str(), "v0.0.1");
        assert_eq!(release.package.as_str(), "GenisPackage");
        assert_eq!(release.data_hash, "testDataHash");
    }

    #[tokio::test]
    async fn version_created_without_default_leaves_pointer_unset() {
        let (store, engine) = setup();
        engine
            .handle(&RegistryEvent::package_created(owner(), "lib"))
            .await
            .unwrap();
        engine
            .handle(&RegistryEvent::package_version_created("lib", "v1", "h", false))
            .await
            .unwrap();

        let pkg = store.get_package(&"lib".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, None);
        assert!(store.get_release(&"v1lib".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn explicit_default_change_keeps_old_release() {
        let (store, engine) = setup();
        genis_with_first_release(&engine).await;
        let first = store.get_release(&"v0.0.1GenisPackage".into()).await.unwrap();

        engine
            .handle(&RegistryEvent::package_version_created("GenisPackage", "v0.0.2", "hash2", false))
            .await
            .unwrap();
        let outcome = engine
            .handle(&RegistryEvent::default_version_changed("GenisPackage", "v0.0.2"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Applied);
        let pkg = store.get_package(&"GenisPackage".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, Some(ReleaseId::from("v0.0.2GenisPackage")));
        assert_eq!(store.get_release(&"v0.0.1GenisPackage".into()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn unknown_default_target_is_dropped() {
        let (store, engine) = setup();
        genis_with_first_release(&engine).await;
        let before = store.snapshot();

        let outcome = engine
            .handle(&RegistryEvent::default_version_changed("GenisPackage", "v9.9.9"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Dropped(DropReason::ReleaseNotFound("v9.9.9GenisPackage".into()))
        );
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn default_change_for_unknown_package_is_dropped() {
        let (store, engine) = setup();

        let outcome = engine
            .handle(&RegistryEvent::default_version_changed("nope", "v1"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Dropped(DropReason::PackageNotFound("nope".into())));
        assert_eq!(store.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn repeated_default_change_is_duplicate() {
        let (_store, engine) = setup();
        genis_with_first_release(&engine).await;

        let outcome = engine
            .handle(&RegistryEvent::default_version_changed("GenisPackage", "v0.0.1"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Duplicate);
    }

    #[tokio::test]
    async fn duplicate_release_with_same_payload_is_benign() {
        let (store, engine) = setup();
        genis_with_first_release(&engine).await;
        let before = store.snapshot();

        let outcome = engine
            .handle(&RegistryEvent::package_version_created(
                "GenisPackage",
                "v0.0.1",
                "testDataHash",
                true,
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Duplicate);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn duplicate_release_with_other_hash_is_mismatch() {
        let (store, engine) = setup();
        genis_with_first_release(&engine).await;
        let before = store.snapshot();

        let err = engine
            .handle(&RegistryEvent::package_version_created(
                "GenisPackage",
                "v0.0.1",
                "tampered",
                false,
            ))
            .await
            .unwrap_err();

        match err {
            ProjectionError::IntegrityMismatch { entity, key, detail } => {
                assert_eq!(entity, "release");
                assert_eq!(key, "v0.0.1GenisPackage");
                assert!(detail.contains("dataHash"));
            }
            other => panic!("Expected IntegrityMismatch, got {other:?}"),
        }
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn colliding_release_id_is_mismatch_not_overwrite() {
        let (store, engine) = setup();
        engine.handle(&RegistryEvent::package_created(owner(), "2x")).await.unwrap();
        engine.handle(&RegistryEvent::package_created(owner(), "x")).await.unwrap();
        engine
            .handle(&RegistryEvent::package_version_created("2x", "1", "h", false))
            .await
            .unwrap();

        let err = engine
            .handle(&RegistryEvent::package_version_created("x", "12", "h", true))
            .await
            .unwrap_err();

        assert!(matches!(err, ProjectionError::IntegrityMismatch { .. }));
        let stored = store.get_release(&"12x".into()).await.unwrap().unwrap();
        assert_eq!(stored.package.as_str(), "2x");
        let x = store.get_package(&"x".into()).await.unwrap().unwrap();
        assert_eq!(x.default_version, None);
    }

    #[tokio::test]
    async fn default_change_onto_colliding_release_is_dropped() {
        let (store, engine) = setup();
        engine.handle(&RegistryEvent::package_created(owner(), "2x")).await.unwrap();
        engine.handle(&RegistryEvent::package_created(owner(), "x")).await.unwrap();
        engine
            .handle(&RegistryEvent::package_version_created("2x", "1", "h", false))
            .await
            .unwrap();

        let before = store.snapshot();

        let outcome = engine
            .handle(&RegistryEvent::default_version_changed("x", "12"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Dropped(DropReason::ReleaseNotFound("12x".into())));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn stale_redelivery_through_runner_keeps_newer_default() {
        use pkgmg_events::{LogPosition, ProjectionRunner, RunOutcome};

        let (store, engine) = setup();
        let first = EventEnvelope::new(
            LogPosition::new(1, 1),
            RegistryEvent::package_version_created("GenisPackage", "v0.0.1", "testDataHash", true),
        );
        let log = vec![
            EventEnvelope::new(LogPosition::new(1, 0), RegistryEvent::package_created(owner(), "GenisPackage")),
            first.clone(),
            EventEnvelope::new(
                LogPosition::new(2, 0),
                RegistryEvent::package_version_created("GenisPackage", "v0.0.2", "hash2", false),
            ),
            EventEnvelope::new(
                LogPosition::new(3, 0),
                RegistryEvent::default_version_changed("GenisPackage", "v0.0.2"),
            ),
        ];
        let mut runner = ProjectionRunner::new(engine);
        for envelope in &log {
            runner.apply(envelope).await.unwrap();
        }

        assert_eq!(runner.apply(&first).await.unwrap(), RunOutcome::Skipped);
        let pkg = store.get_package(&"GenisPackage".into()).await.unwrap().unwrap();
        assert_eq!(pkg.default_version, Some(ReleaseId::from("v0.0.2GenisPackage")));
    }

    /// Store whose `set_default_version` fails transiently a fixed number of times.
    struct FlakyDefaults {
        inner: InMemoryEntityStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl EntityStore for FlakyDefaults {
        async fn create_package(&self, name: &PackageName, owner: &Address) -> Result<(), StoreError> {
            self.inner.create_package(name, owner).await
        }

        async fn get_package(&self, name: &PackageName) -> Result<Option<Package>, StoreError> {
            self.inner.get_package(name).await
        }

        async fn set_default_version(&self, name: &PackageName, release: &ReleaseId) -> Result<(), StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.set_default_version(name, release).await
        }

        async fn create_release(&self, release: &Release) -> Result<(), StoreError> {
            self.inner.create_release(release).await
        }

        async fn get_release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
            self.inner.get_release(id).await
        }

        async fn list_packages(&self) -> Result<Vec<Package>, StoreError> {
            self.inner.list_packages().await
        }

        async fn list_releases(&self, package: &PackageName) -> Result<Vec<Release>, StoreError> {
            self.inner.list_releases(package).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn reinvoking_after_partial_failure_completes_the_event() {
        let store = Arc::new(FlakyDefaults {
            inner: InMemoryEntityStore::new(),
            failures_left: AtomicU32::new(1),
        });
        let engine = RegistryProjection::new(store.clone());
        engine
            .handle(&RegistryEvent::package_created(owner(), "lib"))
            .await
            .unwrap();
        let ev = RegistryEvent::package_version_created("lib", "v1", "h", true);

        let err = engine.handle(&ev).await.unwrap_err();
        assert!(err.is_transient());
        // The release exists, the pointer does not dangle.
        assert!(store.inner.get_release(&"v1lib".into()).await.unwrap().is_some());
        assert_eq!(
            store.inner.get_package(&"lib".into()).await.unwrap().unwrap().default_version,
            None
        );

        assert_eq!(engine.handle(&ev).await.unwrap(), Outcome::Duplicate);
        assert_eq!(
            store.inner.get_package(&"lib".into()).await.unwrap().unwrap().default_version,
            Some(ReleaseId::from("v1lib"))
        );
    }
}
