use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use gallery_core::DomainError;
use gallery_infra::CartServiceError;

pub fn service_error_to_response(err: CartServiceError) -> axum::response::Response {
    match err {
        CartServiceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        CartServiceError::OwnershipMismatch(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        CartServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CartServiceError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        CartServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CartServiceError::EmptyCart => json_error(StatusCode::CONFLICT, "empty_cart", "cart is empty"),
        CartServiceError::Store(e) => {
            tracing::error!(error = %e, "cart store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage failure")
        }
    }
}

/// Request input rejected before it reaches the cart service.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    service_error_to_response(err.into())
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
