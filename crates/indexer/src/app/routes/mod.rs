use axum::{Router, routing::get};

pub mod packages;
pub mod releases;
pub mod system;

/// Router for all query endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/packages", get(packages::list_packages))
        .route("/packages/:name", get(packages::get_package))
        .route("/packages/:name/releases", get(packages::list_releases))
        .route("/releases/:id", get(releases::get_release))
}
