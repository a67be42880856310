use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;

use bankapi_auth::{AccountStore, GateChain, RegisterUser, UpdateProfile, permissions};

use crate::app::services::AppServices;
use crate::app::{dto, errors::ApiError};
use crate::authz::guarded;
use crate::context::UserContext;

pub fn router(store: Arc<dyn AccountStore>) -> Router {
    Router::new()
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
        .route(
            "/v1/users/me",
            guarded(
                get(show_current_user).patch(update_current_user),
                GateChain::activated(),
                store.clone(),
            ),
        )
        .route(
            "/v1/users/:id",
            guarded(
                get(show_user),
                GateChain::permission(permissions::USERS_READ),
                store.clone(),
            ),
        )
        .route(
            "/v1/users/:id/permissions",
            guarded(
                post(grant_permissions),
                GateChain::permission(permissions::USERS_WRITE),
                store,
            ),
        )
}

/// Register an inactive account. The activation token is returned once in
/// the response and also handed to the notifier in the background.
pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegisterUser>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = body?;
    let registration = services.accounts.register(input, Utc::now()).await?;
    let body = dto::registration_to_json(&registration);
    services.notify_activation(registration);

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ActivateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let user = services.accounts.activate(&body.token, Utc::now()).await?;
    Ok(Json(dto::user_to_json(&user)).into_response())
}

pub async fn show_current_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Response, ApiError> {
    let permissions = services.accounts.permissions(ctx.user().id).await?;
    Ok(Json(dto::user_with_permissions_to_json(ctx.user(), &permissions)).into_response())
}

pub async fn update_current_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    body: Result<Json<UpdateProfile>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(changes) = body?;
    let user = services
        .accounts
        .update_profile(ctx.user(), changes)
        .await?;
    Ok(Json(dto::user_to_json(&user)).into_response())
}

pub async fn show_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = dto::parse_user_id(&id)?;
    let user = services.accounts.get_user(id).await?;
    Ok(Json(dto::user_to_json(&user)).into_response())
}

pub async fn grant_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::GrantPermissionsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = dto::parse_user_id(&id)?;
    let Json(body) = body?;
    let permissions = services.accounts.grant(id, body.codes).await?;
    Ok(Json(serde_json::json!({ "permissions": permissions.sorted() })).into_response())
}
