use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bankapi_core::{ExpectedVersion, UserId, Versioned};

use super::r#trait::{AccountStore, StoreError};
use crate::permissions::{Permission, Permissions};
use crate::token::{Scope, Token, TokenHash};
use crate::user::{NewUser, User};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: UserId,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    users: BTreeMap<UserId, User>,
    tokens: HashMap<TokenHash, StoredToken>,
    permissions: HashMap<UserId, HashSet<Permission>>,
}

impl State {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

/// In-memory account store.
///
/// Intended for tests/dev. Emails compare case-insensitively, matching the
/// `citext` column of the Postgres schema.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    state: RwLock<State>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let hash = TokenHash::of(plaintext);
        let state = self.read()?;

        let token = state
            .tokens
            .get(&hash)
            .filter(|t| t.scope == scope && t.expiry > now)
            .ok_or(StoreError::NotFound)?;

        state
            .users
            .get(&token.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state.email_taken(&user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        state.last_id += 1;
        let stored = User {
            id: UserId::new(state.last_id),
            username: user.username,
            email: user.email,
            password: user.password,
            activated: user.activated,
            version: 1,
            created_at: Utc::now(),
        };
        state.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut state = self.write()?;

        // A missing row is indistinguishable from a stale version, as in SQL.
        let current = state
            .users
            .get(&user.id)
            .ok_or(StoreError::EditConflict)?;
        ExpectedVersion::Exact(user.version())
            .check(current.version())
            .map_err(|_| StoreError::EditConflict)?;

        if state.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }

        let mut stored = user.clone();
        stored.version += 1;
        stored.created_at = current.created_at;
        state.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        state.tokens.insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn delete_tokens_for_user(
        &self,
        scope: Scope,
        user_id: UserId,
    ) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_hash, t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - state.tokens.len()) as u64)
    }

    async fn get_permissions_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        let state = self.read()?;
        Ok(state
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant_permissions(
        &self,
        user_id: UserId,
        codes: &[Permission],
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        state
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().cloned());
        Ok(())
    }
}
