//! Account flows: registration, activation, login, logout, profile updates
//! and permission grants.
//!
//! Every flow takes `now` explicitly; the HTTP layer passes the wall clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use bankapi_core::{ExpectedVersion, UserId, ValidationErrors};

use crate::claims::{Hs256Jwt, SignedToken, TokenValidationError};
use crate::password::{self, PasswordError, PasswordHasher};
use crate::permissions::{ACCOUNTS_READ, Permission, Permissions};
use crate::store::{AccountStore, StoreError};
use crate::token::{self, Scope, Token, TokenError, TokenIssuer, TokenPolicy};
use crate::user::{self, NewUser, RegisterUser, UpdateProfile, User};

const DUPLICATE_EMAIL: &str = "a user with this email address already exists";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unknown email or wrong password; deliberately indistinguishable.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("unable to update the record due to an edit conflict")]
    EditConflict,

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(TokenError),

    #[error("failed to sign claims: {0}")]
    Signing(TokenValidationError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<ValidationErrors> for AccountError {
    fn from(value: ValidationErrors) -> Self {
        AccountError::Validation(value)
    }
}

impl From<StoreError> for AccountError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::EditConflict => AccountError::EditConflict,
            StoreError::DuplicateEmail => {
                AccountError::Validation(ValidationErrors::single("email", DUPLICATE_EMAIL))
            }
            other => AccountError::Store(other),
        }
    }
}

impl From<TokenError> for AccountError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Store(e) => e.into(),
            other => AccountError::Token(other),
        }
    }
}

/// Login input.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    #[serde(deserialize_with = "password::deserialize_secret")]
    pub password: SecretString,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        user::validate_email(&mut errors, &self.email);
        password::validate_plaintext(&mut errors, &self.password);
        errors.into_result()
    }
}

/// A user together with the activation token just issued for them.
#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub activation: Token,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    signer: Arc<Hs256Jwt>,
    default_permissions: Vec<Permission>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, signer: Arc<Hs256Jwt>) -> Self {
        Self {
            issuer: TokenIssuer::new(store.clone(), TokenPolicy::default()),
            store,
            hasher: PasswordHasher::default(),
            signer,
            default_permissions: vec![ACCOUNTS_READ],
        }
    }

    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.issuer = TokenIssuer::new(self.store.clone(), policy);
        self
    }

    pub fn with_default_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.default_permissions = permissions;
        self
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Create an inactive user, grant the default permissions and issue an
    /// activation token.
    pub async fn register(
        &self,
        input: RegisterUser,
        now: DateTime<Utc>,
    ) -> Result<Registration, AccountError> {
        input.validate()?;

        let password = self.hasher.hash(&input.password)?;
        let user = self
            .store
            .insert_user(NewUser {
                username: input.name.trim().to_string(),
                email: user::normalize_email(&input.email),
                password,
                activated: false,
            })
            .await?;

        tracing::info!(user_id = %user.id, "user registered");
        let activation = self.prepare_activation(&user, now).await?;

        Ok(Registration { user, activation })
    }

    /// Issue a fresh activation token for a registered, still inactive user
    /// who proves the password. Earlier activation tokens stop working.
    ///
    /// Also the recovery path when registration stored the user but failed
    /// before the token went out.
    pub async fn reissue_activation(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<Registration, AccountError> {
        let user = self.check_credentials(credentials).await?;
        if user.activated {
            return Err(
                ValidationErrors::single("email", "user account has already been activated")
                    .into(),
            );
        }

        self.store
            .delete_tokens_for_user(Scope::Activation, user.id)
            .await?;
        let activation = self.prepare_activation(&user, now).await?;
        tracing::info!(user_id = %user.id, "activation token reissued");
        Ok(Registration { user, activation })
    }

    /// Default grants are idempotent, so a retry can repeat them safely.
    async fn prepare_activation(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Token, AccountError> {
        if !self.default_permissions.is_empty() {
            self.store
                .grant_permissions(user.id, &self.default_permissions)
                .await?;
        }
        Ok(self.issuer.issue(user.id, Scope::Activation, now).await?)
    }

    /// Consume an activation token: drop every outstanding activation token
    /// of its owner, then mark the owner activated.
    ///
    /// Tokens go first so that a token can never activate twice. If the
    /// update then fails, the owner asks for a new token through
    /// [`AccountService::reissue_activation`].
    pub async fn activate(&self, plaintext: &str, now: DateTime<Utc>) -> Result<User, AccountError> {
        token::validate_plaintext(plaintext)?;

        let mut user = match self
            .store
            .get_user_for_token(Scope::Activation, plaintext, now)
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ValidationErrors::single(
                    "token",
                    "invalid or expired activation token",
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .delete_tokens_for_user(Scope::Activation, user.id)
            .await?;
        user.activated = true;
        let user = self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "user activated");
        Ok(user)
    }

    async fn check_credentials(&self, credentials: &Credentials) -> Result<User, AccountError> {
        credentials.validate()?;

        let user = match self
            .store
            .get_user_by_email(&user::normalize_email(&credentials.email))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AccountError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if !user.password.matches(&credentials.password)? {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Exchange email and password for an opaque authentication token.
    pub async fn login(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<Token, AccountError> {
        let user = self.check_credentials(credentials).await?;
        let token = self
            .issuer
            .issue(user.id, Scope::Authentication, now)
            .await?;
        tracing::info!(user_id = %user.id, "authentication token issued");
        Ok(token)
    }

    /// Exchange email and password for a signed claim.
    pub async fn login_signed(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, AccountError> {
        let user = self.check_credentials(credentials).await?;
        let signed = self
            .signer
            .issue(user.id, now)
            .map_err(AccountError::Signing)?;
        tracing::info!(user_id = %user.id, "signed claim issued");
        Ok(signed)
    }

    /// Delete every authentication token the user holds.
    pub async fn revoke(&self, user: &User) -> Result<u64, AccountError> {
        let removed = self
            .store
            .delete_tokens_for_user(Scope::Authentication, user.id)
            .await?;
        tracing::info!(user_id = %user.id, removed, "authentication tokens revoked");
        Ok(removed)
    }

    /// Apply a partial update to `user`, failing with `EditConflict` if the
    /// client's `version` or the stored row has moved on.
    pub async fn update_profile(
        &self,
        user: &User,
        changes: UpdateProfile,
    ) -> Result<User, AccountError> {
        changes.validate()?;
        ExpectedVersion::from(changes.version)
            .check(user.version)
            .map_err(|_| AccountError::EditConflict)?;

        let mut updated = user.clone();
        if let Some(name) = changes.name {
            updated.username = name.trim().to_string();
        }
        if let Some(email) = changes.email {
            updated.email = user::normalize_email(&email);
        }
        if let Some(password) = changes.password {
            updated.password = self.hasher.hash(&password)?;
        }

        let stored = self.store.update_user(&updated).await?;
        tracing::info!(user_id = %stored.id, version = stored.version, "profile updated");
        Ok(stored)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AccountError> {
        match self.store.get_user_by_id(id).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AccountError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn permissions(&self, id: UserId) -> Result<Permissions, AccountError> {
        Ok(self.store.get_permissions_for_user(id).await?)
    }

    /// Grant permission codes to a user; returns the resulting set.
    pub async fn grant(
        &self,
        id: UserId,
        codes: Vec<String>,
    ) -> Result<Permissions, AccountError> {
        let mut errors = ValidationErrors::new();
        errors.check(!codes.is_empty(), "codes", "must contain at least 1 entry");
        errors.check(
            codes.iter().all(|c| is_permission_code(c)),
            "codes",
            "must be of the form resource:action",
        );
        errors.into_result()?;

        let codes: Vec<Permission> = codes.into_iter().map(Permission::new).collect();
        match self.store.grant_permissions(id, &codes).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AccountError::UserNotFound),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %id, granted = codes.len(), "permissions granted");
        self.permissions(id).await
    }
}

fn is_permission_code(code: &str) -> bool {
    match code.split_once(':') {
        Some((resource, action)) => {
            let part_ok = |s: &str| {
                !s.is_empty()
                    && s
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            };
            part_ok(resource) && part_ok(action)
        }
        None => false,
    }
}
