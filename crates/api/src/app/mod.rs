//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and account/authenticator wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::from_fn_with_state,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info_span};

use bankapi_auth::{AccountStore, ActivationNotifier};
use bankapi_infra::LogNotifier;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let store = services::build_store(config).await?;
    build_app_with(config, store, Arc::new(LogNotifier))
}

/// Build the router over an already constructed store and notifier.
pub fn build_app_with(
    config: &ApiConfig,
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn ActivationNotifier>,
) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config, store, notifier)?);
    let auth_state = middleware::AuthState {
        authenticator: services.authenticator.clone(),
    };
    tracing::info!(mode = ?services.authenticator.mode(), "authentication mode");

    Ok(routes::router(services.store.clone(), services.authenticator.mode())
        .layer(Extension(services))
        .layer(from_fn_with_state(auth_state, middleware::authenticate))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http().make_span_with(make_span))))
}

fn make_span(request: &Request<Body>) -> Span {
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
    )
}
