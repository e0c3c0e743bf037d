use axum::{http::StatusCode, middleware::Next, response::Response};

use crate::app::errors;
use crate::context::identity_from_headers;

/// Attach the caller's [`gallery_cart::IdentityContext`] to the request.
///
/// Requests without a usable session id are rejected with 401.
pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let identity = identity_from_headers(req.headers()).map_err(|e| {
        tracing::debug!(error = %e, "rejecting request without a usable identity");
        errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string())
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
