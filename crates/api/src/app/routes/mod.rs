use axum::Router;

pub mod cart;
pub mod session;
pub mod system;

/// Router for all endpoints that need the caller's identity.
pub fn router() -> Router {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/session", session::router())
}
