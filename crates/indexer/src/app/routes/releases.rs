use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use pkgmg_core::ReleaseId;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn get_release(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = ReleaseId::new(id);
    match services.store().get_release(&id).await {
        Ok(Some(release)) => Json(release).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "release_not_found",
            format!("release {id} not found"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}
