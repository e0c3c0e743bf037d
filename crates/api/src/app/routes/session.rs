use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use gallery_cart::{IdentityContext, LoginEvent};
use gallery_core::UserId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/login", post(login))
}

/// Called by the authentication flow right after credentials were accepted
/// and before the session id is rotated; `x-session-id` is the old id.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let new_session_id = match body.new_session_id(&identity.session_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let event = LoginEvent {
        old_session_id: identity.session_id.clone(),
        new_session_id,
        user_id: UserId::from_uuid(body.user_id),
    };

    match services.on_login(&event).await {
        Ok(cart) => Json(dto::LoginResponse::from(&cart)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
