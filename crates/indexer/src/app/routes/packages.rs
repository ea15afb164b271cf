use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use pkgmg_core::PackageName;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn list_packages(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store().list_packages().await {
        Ok(packages) => Json(packages).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_package(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let name = PackageName::new(name);
    match services.store().get_package(&name).await {
        Ok(Some(package)) => Json(package).into_response(),
        Ok(None) => not_found(&name),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_releases(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let name = PackageName::new(name);
    match services.store().get_package(&name).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(&name),
        Err(e) => return errors::store_error_to_response(e),
    }

    match services.store().list_releases(&name).await {
        Ok(releases) => Json(releases).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

fn not_found(name: &PackageName) -> axum::response::Response {
    errors::json_error(
        StatusCode::NOT_FOUND,
        "package_not_found",
        format!("package {name} not found"),
    )
}
