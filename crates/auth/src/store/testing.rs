//! Store doubles shared by the engine's unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use bankapi_core::UserId;

use super::{AccountStore, InMemoryAccountStore, StoreError};
use crate::password::{MIN_COST, PasswordHasher};
use crate::permissions::{Permission, Permissions};
use crate::token::{Scope, Token};
use crate::user::{NewUser, User};

/// In-memory store that counts permission lookups and can be switched into
/// failing mode, as a whole or per operation.
#[derive(Debug, Default)]
pub(crate) struct ProbeStore {
    inner: InMemoryAccountStore,
    permission_lookups: AtomicUsize,
    failing: AtomicBool,
    timing_out: Mutex<HashSet<&'static str>>,
}

impl ProbeStore {
    pub(crate) fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Make every call to `operation` time out until [`ProbeStore::heal`].
    pub(crate) fn time_out(&self, operation: &'static str) {
        self.timing_out.lock().unwrap().insert(operation);
    }

    pub(crate) fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
        self.timing_out.lock().unwrap().clear();
    }

    fn guard(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::backend("store unavailable"));
        }
        if self.timing_out.lock().unwrap().contains(operation) {
            return Err(StoreError::Timeout(Duration::from_secs(3)));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for ProbeStore {
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.guard("get_user_by_id")?;
        self.inner.get_user_by_id(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.guard("get_user_by_email")?;
        self.inner.get_user_by_email(email).await
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.guard("get_user_for_token")?;
        self.inner.get_user_for_token(scope, plaintext, now).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.guard("insert_user")?;
        self.inner.insert_user(user).await
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        self.guard("update_user")?;
        self.inner.update_user(user).await
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        self.guard("insert_token")?;
        self.inner.insert_token(token).await
    }

    async fn delete_tokens_for_user(
        &self,
        scope: Scope,
        user_id: UserId,
    ) -> Result<u64, StoreError> {
        self.guard("delete_tokens_for_user")?;
        self.inner.delete_tokens_for_user(scope, user_id).await
    }

    async fn get_permissions_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        self.guard("get_permissions_for_user")?;
        self.inner.get_permissions_for_user(user_id).await
    }

    async fn grant_permissions(
        &self,
        user_id: UserId,
        codes: &[Permission],
    ) -> Result<(), StoreError> {
        self.guard("grant_permissions")?;
        self.inner.grant_permissions(user_id, codes).await
    }
}

pub(crate) fn fast_hasher() -> PasswordHasher {
    PasswordHasher::new(MIN_COST).unwrap()
}

pub(crate) async fn seed_user(
    store: &dyn AccountStore,
    email: &str,
    password: &str,
    activated: bool,
) -> User {
    let password = fast_hasher()
        .hash(&SecretString::from(password.to_string()))
        .unwrap();
    store
        .insert_user(NewUser {
            username: "alice".to_string(),
            email: email.to_string(),
            password,
            activated,
        })
        .await
        .unwrap()
}
