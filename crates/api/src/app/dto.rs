use serde::Deserialize;
use serde_json::{Value, json};

use bankapi_auth::{Permissions, Registration, User};
use bankapi_core::UserId;

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionsRequest {
    pub codes: Vec<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn user_to_json(user: &User) -> Value {
    json!({ "user": user })
}

pub fn registration_to_json(registration: &Registration) -> Value {
    json!({
        "user": registration.user,
        "activation_token": registration.activation,
    })
}

pub fn user_with_permissions_to_json(user: &User, permissions: &Permissions) -> Value {
    json!({
        "user": user,
        "permissions": permissions.sorted(),
    })
}

/// Path ids that do not parse are reported as missing resources.
pub fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}
