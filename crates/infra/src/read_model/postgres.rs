//! Postgres-backed entity store implementation.
//!
//! Packages and releases live in two tables keyed by name and release id.
//! Every invariant check is folded into the write statement itself, so no
//! reader can observe a half-applied change.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use pkgmg_core::{Address, PackageName, ReleaseId, VersionName};
use pkgmg_registry::{Package, Release};

use super::{EntityStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS packages (
        name            TEXT PRIMARY KEY,
        owner           TEXT NOT NULL,
        default_version TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS releases (
        id        TEXT PRIMARY KEY,
        version   TEXT NOT NULL,
        package   TEXT NOT NULL REFERENCES packages (name),
        data_hash TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS releases_package_idx ON releases (package)
    "#,
];

/// Postgres-backed entity store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is cheap to clone and shareable between
/// the projection writer and the query readers.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and make sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(store_error)?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }

    async fn package_exists(&self, name: &PackageName) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM packages WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.is_some())
    }
}

/// Map a driver error onto the store's error kinds.
///
/// Decoding failures mean the stored rows are bad and retrying cannot help;
/// everything else is treated as a connectivity problem.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(err.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn package_from_row(row: &PgRow) -> Result<Package, StoreError> {
    let name: String = row.try_get("name").map_err(store_error)?;
    let owner: String = row.try_get("owner").map_err(store_error)?;
    let default_version: Option<String> = row.try_get("default_version").map_err(store_error)?;

    let owner = Address::parse(&owner)
        .map_err(|e| StoreError::Corrupt(format!("package {name}: {e}")))?;

    Ok(Package {
        name: PackageName::new(name),
        owner,
        default_version: default_version.map(ReleaseId::new),
    })
}

fn release_from_row(row: &PgRow) -> Result<Release, StoreError> {
    Ok(Release {
        id: ReleaseId::new(row.try_get::<String, _>("id").map_err(store_error)?),
        version: VersionName::new(row.try_get::<String, _>("version").map_err(store_error)?),
        package: PackageName::new(row.try_get::<String, _>("package").map_err(store_error)?),
        data_hash: row.try_get("data_hash").map_err(store_error)?,
    })
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    #[instrument(skip(self), fields(operation = "create_package"))]
    async fn create_package(&self, name: &PackageName, owner: &Address) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO packages (name, owner, default_version)
            VALUES ($1, $2, NULL)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name.as_str())
        .bind(owner.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::PackageAlreadyExists(name.clone()));
        }
        Ok(())
    }

    async fn get_package(&self, name: &PackageName) -> Result<Option<Package>, StoreError> {
        let row = sqlx::query("SELECT name, owner, default_version FROM packages WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(package_from_row).transpose()
    }

    #[instrument(skip(self), fields(operation = "set_default_version"))]
    async fn set_default_version(
        &self,
        name: &PackageName,
        release: &ReleaseId,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE packages
            SET default_version = $2
            WHERE name = $1
              AND EXISTS (SELECT 1 FROM releases WHERE id = $2 AND package = $1)
            "#,
        )
        .bind(name.as_str())
        .bind(release.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if done.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing was written; work out which precondition failed.
        if !self.package_exists(name).await? {
            return Err(StoreError::PackageNotFound(name.clone()));
        }
        match self.get_release(release).await? {
            None => Err(StoreError::ReleaseNotFound(release.clone())),
            Some(r) => Err(StoreError::ReleasePackageMismatch {
                release: release.clone(),
                expected: name.clone(),
                actual: r.package,
            }),
        }
    }

    #[instrument(skip(self, release), fields(operation = "create_release", release = %release.id))]
    async fn create_release(&self, release: &Release) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO releases (id, version, package, data_hash)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM packages WHERE name = $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(release.id.as_str())
        .bind(release.version.as_str())
        .bind(release.package.as_str())
        .bind(&release.data_hash)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if done.rows_affected() > 0 {
            return Ok(());
        }

        if self.get_release(&release.id).await?.is_some() {
            Err(StoreError::ReleaseAlreadyExists(release.id.clone()))
        } else {
            Err(StoreError::PackageNotFound(release.package.clone()))
        }
    }

    async fn get_release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
        let row = sqlx::query("SELECT id, version, package, data_hash FROM releases WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(release_from_row).transpose()
    }

    async fn list_packages(&self) -> Result<Vec<Package>, StoreError> {
        let rows = sqlx::query("SELECT name, owner, default_version FROM packages ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(package_from_row).collect()
    }

    async fn list_releases(&self, package: &PackageName) -> Result<Vec<Release>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, version, package, data_hash FROM releases WHERE package = $1 ORDER BY id",
        )
        .bind(package.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(release_from_row).collect()
    }

    #[instrument(skip(self), fields(operation = "clear"))]
    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("TRUNCATE releases, packages")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
