//! Indexer binary support: HTTP query API and process wiring.

pub mod app;
pub mod server;
