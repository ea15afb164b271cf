use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use pkgmg_core::{Address, Entity, PackageName, ReleaseId};
use pkgmg_registry::{Package, Release};

/// Errors raised by entity store operations.
///
/// Everything except `Unavailable` is a deterministic rejection: retrying the
/// same call against the same state yields the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("package {0} already exists")]
    PackageAlreadyExists(PackageName),

    #[error("release {0} already exists")]
    ReleaseAlreadyExists(ReleaseId),

    #[error("package {0} not found")]
    PackageNotFound(PackageName),

    #[error("release {0} not found")]
    ReleaseNotFound(ReleaseId),

    #[error("release {release} belongs to package {actual}, not {expected}")]
    ReleasePackageMismatch {
        release: ReleaseId,
        expected: PackageName,
        actual: PackageName,
    },

    /// Stored data could not be decoded into an entity.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Durable keyed storage for packages and releases.
///
/// Every mutating call checks its invariant and writes in one atomic step:
/// - `create_package` rejects an existing name
/// - `create_release` rejects an existing id and an unknown package
/// - `set_default_version` rejects an unknown package, an unknown release, and a
///   release owned by another package
///
/// Readers never observe a release without its package, or a default version
/// pointing at a missing release.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_package(&self, name: &PackageName, owner: &Address) -> Result<(), StoreError>;

    async fn get_package(&self, name: &PackageName) -> Result<Option<Package>, StoreError>;

    async fn set_default_version(
        &self,
        name: &PackageName,
        release: &ReleaseId,
    ) -> Result<(), StoreError>;

    async fn create_release(&self, release: &Release) -> Result<(), StoreError>;

    async fn get_release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError>;

    /// All packages, ordered by name.
    async fn list_packages(&self) -> Result<Vec<Package>, StoreError>;

    /// Releases of one package, ordered by id.
    async fn list_releases(&self, package: &PackageName) -> Result<Vec<Release>, StoreError>;

    /// Remove all projected state (rebuild support).
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    async fn create_package(&self, name: &PackageName, owner: &Address) -> Result<(), StoreError> {
        (**self).create_package(name, owner).await
    }

    async fn get_package(&self, name: &PackageName) -> Result<Option<Package>, StoreError> {
        (**self).get_package(name).await
    }

    async fn set_default_version(
        &self,
        name: &PackageName,
        release: &ReleaseId,
    ) -> Result<(), StoreError> {
        (**self).set_default_version(name, release).await
    }

    async fn create_release(&self, release: &Release) -> Result<(), StoreError> {
        (**self).create_release(release).await
    }

    async fn get_release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
        (**self).get_release(id).await
    }

    async fn list_packages(&self) -> Result<Vec<Package>, StoreError> {
        (**self).list_packages().await
    }

    async fn list_releases(&self, package: &PackageName) -> Result<Vec<Release>, StoreError> {
        (**self).list_releases(package).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// Full contents of a store, for determinism checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub packages: Vec<Package>,
    pub releases: Vec<Release>,
}

#[derive(Debug, Default)]
struct Tables {
    packages: BTreeMap<PackageName, Package>,
    releases: BTreeMap<ReleaseId, Release>,
}

/// In-memory entity store for tests/dev.
///
/// Both collections sit behind one lock so every check-then-write happens under
/// a single write guard.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    inner: RwLock<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        match self.inner.read() {
            Ok(t) => Snapshot {
                packages: t.packages.values().cloned().collect(),
                releases: t.releases.values().cloned().collect(),
            },
            Err(_) => Snapshot::default(),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn insert<E: Entity>(table: &mut BTreeMap<E::Id, E>, entity: E) {
    table.insert(entity.id().clone(), entity);
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn create_package(&self, name: &PackageName, owner: &Address) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.packages.contains_key(name) {
            return Err(StoreError::PackageAlreadyExists(name.clone()));
        }
        insert(&mut t.packages, Package::new(name.clone(), owner.clone()));
        Ok(())
    }

    async fn get_package(&self, name: &PackageName) -> Result<Option<Package>, StoreError> {
        Ok(self.read()?.packages.get(name).cloned())
    }

    async fn set_default_version(
        &self,
        name: &PackageName,
        release: &ReleaseId,
    ) -> Result<(), StoreError> {
        let mut t = self.write()?;
        let owner = match t.releases.get(release) {
            Some(r) => r.package.clone(),
            None => {
                if !t.packages.contains_key(name) {
                    return Err(StoreError::PackageNotFound(name.clone()));
                }
                return Err(StoreError::ReleaseNotFound(release.clone()));
            }
        };

        let package = t
            .packages
            .get_mut(name)
            .ok_or_else(|| StoreError::PackageNotFound(name.clone()))?;
        if owner != *name {
            return Err(StoreError::ReleasePackageMismatch {
                release: release.clone(),
                expected: name.clone(),
                actual: owner,
            });
        }
        package.default_version = Some(release.clone());
        Ok(())
    }

    async fn create_release(&self, release: &Release) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.releases.contains_key(&release.id) {
            return Err(StoreError::ReleaseAlreadyExists(release.id.clone()));
        }
        if !t.packages.contains_key(&release.package) {
            return Err(StoreError::PackageNotFound(release.package.clone()));
        }
        insert(&mut t.releases, release.clone());
        Ok(())
    }

    async fn get_release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
        Ok(self.read()?.releases.get(id).cloned())
    }

    async fn list_packages(&self) -> Result<Vec<Package>, StoreError> {
        Ok(self.read()?.packages.values().cloned().collect())
    }

    async fn list_releases(&self, package: &PackageName) -> Result<Vec<Release>, StoreError> {
        Ok(self
            .read()?
            .releases
            .values()
            .filter(|r| r.package == *package)
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut t = self.write()?;
        t.packages.clear();
        t.releases.clear();
        Ok(())
    }
}
