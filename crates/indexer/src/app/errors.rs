use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pkgmg_infra::read_model::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Unavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        StoreError::PackageNotFound(name) => json_error(
            StatusCode::NOT_FOUND,
            "package_not_found",
            format!("package {name} not found"),
        ),
        StoreError::ReleaseNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "release_not_found",
            format!("release {id} not found"),
        ),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            other.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
