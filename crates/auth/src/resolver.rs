//! Request authentication.
//!
//! Turns the raw `Authorization` header into an [`Identity`]. Terminal states
//! are `Ok(Anonymous)`, `Ok(Authenticated(user))`, or a rejection. Opaque and
//! signed-claim modes converge on the same result type, so the gates
//! downstream never need to know which one ran.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::claims::JwtValidator;
use crate::identity::Identity;
use crate::store::{AccountStore, StoreError};
use crate::token::{self, Scope};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Header present but not a well-formed bearer credential.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Well-formed, but does not resolve to an active credential.
    #[error("invalid authentication token")]
    InvalidAuthenticationToken,

    #[error(transparent)]
    Store(StoreError),
}

/// Which kind of bearer value the resolver accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Opaque,
    SignedClaims,
}

impl core::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opaque" => Ok(AuthMode::Opaque),
            "jwt" | "signed" => Ok(AuthMode::SignedClaims),
            other => Err(format!("unknown auth mode '{other}'")),
        }
    }
}

#[derive(Clone)]
enum Strategy {
    Opaque,
    SignedClaims(Arc<dyn JwtValidator>),
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn AccountStore>,
    strategy: Strategy,
}

impl Authenticator {
    /// Resolve 26-character opaque tokens through the store.
    pub fn opaque(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            strategy: Strategy::Opaque,
        }
    }

    /// Resolve HS256 signed claims; the subject is then loaded from the store.
    pub fn signed_claims(store: Arc<dyn AccountStore>, validator: Arc<dyn JwtValidator>) -> Self {
        Self {
            store,
            strategy: Strategy::SignedClaims(validator),
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self.strategy {
            Strategy::Opaque => AuthMode::Opaque,
            Strategy::SignedClaims(_) => AuthMode::SignedClaims,
        }
    }

    pub async fn resolve(
        &self,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let Some(header) = authorization else {
            return Ok(Identity::Anonymous);
        };
        let credential = bearer_value(header)?;

        let user = match &self.strategy {
            Strategy::Opaque => {
                if token::validate_plaintext(credential).is_err() {
                    return Err(AuthError::InvalidCredentials);
                }
                self.store
                    .get_user_for_token(Scope::Authentication, credential, now)
                    .await
            }
            Strategy::SignedClaims(validator) => {
                let user_id = validator
                    .validate(credential, now)
                    .and_then(|claims| claims.user_id())
                    .map_err(|e| {
                        tracing::debug!(reason = %e, "signed claim rejected");
                        AuthError::InvalidAuthenticationToken
                    })?;
                self.store.get_user_by_id(user_id).await
            }
        };

        match user {
            Ok(user) => Ok(Identity::Authenticated(user)),
            Err(StoreError::NotFound) => Err(AuthError::InvalidAuthenticationToken),
            Err(e) => Err(AuthError::Store(e)),
        }
    }
}

/// Split `Bearer <value>` on a single space; anything else is malformed.
fn bearer_value(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(value), None) if !value.is_empty() => Ok(value),
        _ => Err(AuthError::InvalidCredentials),
    }
}
