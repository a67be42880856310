use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use bankapi_auth::{Authenticator, Identity};

use crate::app::errors::ApiError;
use crate::context::IdentityContext;

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Authenticator,
}

/// Resolve the request's identity and attach it as [`IdentityContext`].
///
/// Requests without an `Authorization` header continue as anonymous; the
/// gates decide whether that is acceptable. Every response leaving this
/// layer varies on `Authorization`.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let mut response = match resolve_identity(&state, req.headers()).await {
        Ok(identity) => {
            req.extensions_mut().insert(IdentityContext::new(identity));
            next.run(req).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_identity(state: &AuthState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let header = authorization_header(headers)?;
    Ok(state.authenticator.resolve(header, Utc::now()).await?)
}

fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    match headers.get(header::AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::InvalidCredentials),
    }
}
