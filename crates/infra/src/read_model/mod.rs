//! Entity storage for the projected registry state.

pub mod entity_store;
pub mod postgres;

pub use entity_store::{EntityStore, InMemoryEntityStore, Snapshot, StoreError};
pub use postgres::PostgresEntityStore;
