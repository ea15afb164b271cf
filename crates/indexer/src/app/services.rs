use std::sync::Arc;

use pkgmg_infra::config::Persistence;
use pkgmg_infra::projections::{CursorStore, InMemoryCursorStore, PostgresCursorStore};
use pkgmg_infra::read_model::{EntityStore, InMemoryEntityStore, PostgresEntityStore, StoreError};

/// Store handles shared by the worker, the rebuild path and the HTTP layer.
#[derive(Clone)]
pub struct Stores {
    pub entities: Arc<dyn EntityStore>,
    pub cursors: Arc<dyn CursorStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            entities: Arc::new(InMemoryEntityStore::new()),
            cursors: Arc::new(InMemoryCursorStore::new()),
        }
    }

    /// Connect to Postgres and create missing tables.
    pub async fn postgres(database_url: &str) -> Result<Self, StoreError> {
        let entities = PostgresEntityStore::connect(database_url).await?;
        let cursors = PostgresCursorStore::new(entities.pool().clone());
        cursors.ensure_schema().await?;

        Ok(Self {
            entities: Arc::new(entities),
            cursors: Arc::new(cursors),
        })
    }

    pub async fn build(persistence: &Persistence) -> Result<Self, StoreError> {
        match persistence {
            Persistence::InMemory => {
                tracing::info!("using in-memory stores");
                Ok(Self::in_memory())
            }
            Persistence::Postgres { database_url } => {
                tracing::info!("using postgres stores");
                Self::postgres(database_url).await
            }
        }
    }
}

/// Read-side services handed to HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<dyn EntityStore>,
}

impl AppServices {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }
}
