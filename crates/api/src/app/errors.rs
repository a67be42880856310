use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use bankapi_auth::{AccountError, AuthError, AuthzError};
use bankapi_core::ValidationErrors;

/// Everything a handler or middleware can fail with, mapped to one response
/// shape: `{"error": <code>, "message": <text>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid authentication token")]
    InvalidAuthenticationToken,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    NotActivated,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("the requested resource could not be found")]
    NotFound,

    /// Logged server-side; the client only sees a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl core::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::InvalidAuthenticationToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::AuthenticationRequired => {
                (StatusCode::UNAUTHORIZED, "authentication_required")
            }
            ApiError::NotActivated => (StatusCode::FORBIDDEN, "inactive_account"),
            ApiError::NotPermitted => (StatusCode::FORBIDDEN, "not_permitted"),
            ApiError::EditConflict => (StatusCode::CONFLICT, "edit_conflict"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        match self {
            ApiError::Validation(fields) => (
                status,
                axum::Json(json!({
                    "error": code,
                    "message": "the request contains invalid fields",
                    "fields": fields,
                })),
            )
                .into_response(),
            ApiError::InvalidAuthenticationToken => {
                let mut response = json_error(status, code, self.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json_error(
                    status,
                    code,
                    "the server encountered a problem and could not process your request",
                )
            }
            other => json_error(status, code, other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(value: ValidationErrors) -> Self {
        ApiError::Validation(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl From<AccountError> for ApiError {
    fn from(value: AccountError) -> Self {
        match value {
            AccountError::Validation(errors) => ApiError::Validation(errors),
            AccountError::InvalidCredentials => ApiError::InvalidCredentials,
            AccountError::EditConflict => ApiError::EditConflict,
            AccountError::UserNotFound => ApiError::NotFound,
            other => ApiError::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::InvalidAuthenticationToken => ApiError::InvalidAuthenticationToken,
            AuthError::Store(e) => ApiError::internal(e),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::AuthenticationRequired => ApiError::AuthenticationRequired,
            AuthzError::NotActivated => ApiError::NotActivated,
            AuthzError::NotPermitted(_) => ApiError::NotPermitted,
            AuthzError::Store(e) => ApiError::internal(e),
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankapi_auth::{Permission, StoreError};

    #[test]
    fn authorization_failures_map_to_their_status() {
        let cases = [
            (AuthzError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (AuthzError::NotActivated, StatusCode::FORBIDDEN),
            (
                AuthzError::NotPermitted(Permission::new("users:read")),
                StatusCode::FORBIDDEN,
            ),
            (
                AuthzError::Store(StoreError::backend("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn invalid_token_challenges_for_bearer() {
        let response = ApiError::from(AuthError::InvalidAuthenticationToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let response = ApiError::from(AuthError::InvalidCredentials).into_response();
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn timeouts_are_internal_not_denials() {
        let err = ApiError::from(AuthError::Store(StoreError::Timeout(
            std::time::Duration::from_secs(3),
        )));
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn account_errors_keep_their_class() {
        assert!(matches!(
            ApiError::from(AccountError::EditConflict),
            ApiError::EditConflict
        ));
        assert!(matches!(
            ApiError::from(AccountError::InvalidCredentials),
            ApiError::InvalidCredentials
        ));
        assert_eq!(
            ApiError::from(AccountError::Validation(ValidationErrors::single("token", "bad")))
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
