use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bankapi_auth::{AccountStore, NewUser, Permission, Permissions, Scope, StoreError, Token, User};
use bankapi_core::UserId;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounds every call on the wrapped store.
///
/// An elapsed deadline surfaces as `StoreError::Timeout`, never as
/// `NotFound`. Dropping the returned future cancels the in-flight call.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, limit_ms = self.limit.as_millis() as u64, "store call timed out");
                Err(StoreError::Timeout(self.limit))
            }
        }
    }
}

#[async_trait]
impl<S: AccountStore> AccountStore for TimeoutStore<S> {
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.bounded("get_user_by_id", self.inner.get_user_by_id(id))
            .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.bounded("get_user_by_email", self.inner.get_user_by_email(email))
            .await
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.bounded(
            "get_user_for_token",
            self.inner.get_user_for_token(scope, plaintext, now),
        )
        .await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.bounded("insert_user", self.inner.insert_user(user)).await
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        self.bounded("update_user", self.inner.update_user(user)).await
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        self.bounded("insert_token", self.inner.insert_token(token)).await
    }

    async fn delete_tokens_for_user(
        &self,
        scope: Scope,
        user_id: UserId,
    ) -> Result<u64, StoreError> {
        self.bounded(
            "delete_tokens_for_user",
            self.inner.delete_tokens_for_user(scope, user_id),
        )
        .await
    }

    async fn get_permissions_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        self.bounded(
            "get_permissions_for_user",
            self.inner.get_permissions_for_user(user_id),
        )
        .await
    }

    async fn grant_permissions(
        &self,
        user_id: UserId,
        codes: &[Permission],
    ) -> Result<(), StoreError> {
        self.bounded(
            "grant_permissions",
            self.inner.grant_permissions(user_id, codes),
        )
        .await
    }
}
