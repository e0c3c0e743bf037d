use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use gallery_cart::{IdentityContext, Quantity};
use gallery_core::CartItemId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_quantity).delete(remove_item))
        .route("/summary", get(get_summary))
        .route("/checkout", get(checkout))
}

pub async fn get_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.get_cart_view(&identity).await {
        Ok(view) => Json(dto::CartViewResponse::from(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Json(body): Json<dto::AddItemRequest>,
) -> axum::response::Response {
    let request = match body.into_domain() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.add_item(&identity, request).await {
        Ok(added) => {
            let status = if added.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(dto::AddItemResponse::from(&added))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateQuantityRequest>,
) -> axum::response::Response {
    let item_id = match id.parse::<CartItemId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let quantity = match Quantity::new(body.quantity) {
        Ok(q) => q,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.update_quantity(&identity, item_id, quantity).await {
        Ok(item) => Json(dto::CartItemResponse::from(&item)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match id.parse::<CartItemId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.remove_item(&identity, item_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Badge count + mini-cart preview rendered on every page.
pub async fn get_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.shared_summary(&identity).await {
        Ok(summary) => Json(dto::SummaryResponse::from(&summary)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.ensure_checkout_ready(&identity).await {
        Ok(view) => Json(dto::CartViewResponse::from(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
