//! Route-level authorization gates.
//!
//! Runs after [`crate::middleware::authenticate`]: evaluates a
//! [`GateChain`] against the request's identity and, when it passes for a
//! non-anonymous identity, attaches [`UserContext`] for the handler.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};

use bankapi_auth::{AccountStore, GateChain, Identity};

use crate::app::errors::ApiError;
use crate::context::{IdentityContext, UserContext};

#[derive(Clone)]
pub struct GateState {
    chain: Arc<GateChain>,
    store: Arc<dyn AccountStore>,
}

impl GateState {
    pub fn new(chain: GateChain, store: Arc<dyn AccountStore>) -> Self {
        Self {
            chain: Arc::new(chain),
            store,
        }
    }
}

pub async fn gate(
    State(state): State<GateState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let identity = req
        .extensions()
        .get::<IdentityContext>()
        .map(|ctx| ctx.identity().clone())
        .unwrap_or(Identity::Anonymous);

    if let Err(err) = state.chain.check(&identity, state.store.as_ref()).await {
        tracing::debug!(reason = %err, "request rejected by gate");
        return ApiError::from(err).into_response();
    }

    if let Some(user) = identity.into_user() {
        req.extensions_mut().insert(UserContext::new(user));
    }
    next.run(req).await
}

/// Put the handlers of `route` behind `chain`. Unmatched methods still get
/// `405` without consulting the gates.
pub fn guarded(route: MethodRouter, chain: GateChain, store: Arc<dyn AccountStore>) -> MethodRouter {
    route.route_layer(from_fn_with_state(GateState::new(chain, store), gate))
}
