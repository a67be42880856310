use std::sync::Arc;

use axum::{Router, routing::get};

use bankapi_auth::{AccountStore, AuthMode};

pub mod system;
pub mod tokens;
pub mod users;

/// Router for every `/v1` endpoint. Each route carries its own gate chain;
/// identity resolution happens in the outer authenticate layer.
pub fn router(store: Arc<dyn AccountStore>, mode: AuthMode) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(system::healthcheck))
        .merge(users::router(store.clone()))
        .merge(tokens::router(store, mode))
}
