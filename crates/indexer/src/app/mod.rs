//! HTTP API application wiring (Axum router + store wiring).
//!
//! - `services.rs`: store wiring (entity store + cursor store)
//! - `routes/`: HTTP routes + handlers (one file per entity)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, Stores};

/// Build the full HTTP router (public entrypoint used by `server.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
