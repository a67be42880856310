use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use bankapi_core::UserId;

use crate::permissions::{Permission, Permissions};
use crate::token::{Scope, Token};
use crate::user::{NewUser, User};

/// Store operation error.
///
/// `NotFound` is kept distinct from infrastructure failures so callers can
/// translate it at the authentication boundary. A timeout is an
/// infrastructure failure, never a "not found".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("a user with this email address already exists")]
    DuplicateEmail,

    /// The submitted version no longer matches the stored one.
    #[error("edit conflict")]
    EditConflict,

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Persistence contract required by the authentication engine.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Resolve the owner of an active token.
    ///
    /// Hashes `plaintext` the same way the issuer does and only matches a row
    /// whose scope equals `scope` and whose expiry is strictly after `now`.
    async fn get_user_for_token(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Persist a new user, assigning id, creation time and `version = 1`.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Persist `user` if its version is still current; returns the stored
    /// record with the incremented version.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError>;

    /// Delete every token of `scope` owned by `user_id`; returns how many.
    async fn delete_tokens_for_user(&self, scope: Scope, user_id: UserId)
    -> Result<u64, StoreError>;

    async fn get_permissions_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError>;

    async fn grant_permissions(
        &self,
        user_id: UserId,
        codes: &[Permission],
    ) -> Result<(), StoreError>;
}
