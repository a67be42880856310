use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, post},
};
use chrono::Utc;

use bankapi_auth::{AccountStore, AuthMode, Credentials, GateChain};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::guarded;
use crate::context::UserContext;

/// Only the credential kind the authenticator accepts is mounted: opaque
/// tokens (with logout) or signed claims. Signed claims are stateless and
/// cannot be revoked before they expire.
pub fn router(store: Arc<dyn AccountStore>, mode: AuthMode) -> Router {
    let router = Router::new().route("/v1/tokens/activation", post(reissue_activation_token));
    match mode {
        AuthMode::Opaque => router
            .route(
                "/v1/tokens/authentication",
                post(create_authentication_token),
            )
            .route(
                "/v1/tokens/authentication",
                guarded(
                    delete(revoke_authentication_tokens),
                    GateChain::authenticated(),
                    store,
                ),
            ),
        AuthMode::SignedClaims => router.route("/v1/tokens/jwt", post(create_signed_token)),
    }
}

/// New activation token for an inactive account, in exchange for its
/// credentials.
pub async fn reissue_activation_token(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(credentials) = body?;
    let reissued = services
        .accounts
        .reissue_activation(&credentials, Utc::now())
        .await?;
    let body = serde_json::json!({ "activation_token": reissued.activation });
    services.notify_activation(reissued);

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn create_authentication_token(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(credentials) = body?;
    let token = services.accounts.login(&credentials, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "authentication_token": token })),
    )
        .into_response())
}

pub async fn create_signed_token(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(credentials) = body?;
    let signed = services
        .accounts
        .login_signed(&credentials, Utc::now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "authentication_token": signed })),
    )
        .into_response())
}

/// Log out everywhere: drop every opaque authentication token of the caller.
pub async fn revoke_authentication_tokens(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Response, ApiError> {
    let revoked = services.accounts.revoke(ctx.user()).await?;
    Ok(Json(serde_json::json!({
        "message": "authentication tokens revoked",
        "revoked": revoked,
    }))
    .into_response())
}
