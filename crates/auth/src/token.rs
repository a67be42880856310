//! Opaque, scoped bearer tokens.
//!
//! A token's plaintext is 16 random bytes encoded as unpadded base-32 (26
//! characters). Only its SHA-256 digest is persisted or compared; the
//! plaintext is handed to the client once, in the issuance response.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use bankapi_core::{UserId, ValidationErrors};

use crate::store::{AccountStore, StoreError};

/// Length of an encoded token plaintext.
pub const TOKEN_LENGTH: usize = 26;

const TOKEN_ENTROPY_BYTES: usize = 16;

/// Partition of tokens by intended use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Scope {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Scope::Activation),
            "authentication" => Ok(Scope::Authentication),
            other => Err(TokenError::UnknownScope(other.to_string())),
        }
    }
}

/// SHA-256 digest of a token plaintext; the only form that reaches storage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to gather randomness: {0}")]
    Rng(#[from] rand::Error),

    #[error("unknown token scope '{0}'")]
    UnknownScope(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly issued token.
///
/// Serializes to `{"token": ..., "expiry": ...}` only; hash, owner and scope
/// stay server-side.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Generate a new token owned by `user_id`, valid until `now + ttl`.
    pub fn generate(
        user_id: UserId,
        ttl: Duration,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;

        let plaintext = data_encoding::BASE32_NOPAD.encode(&bytes);
        let hash = TokenHash::of(&plaintext);

        Ok(Self {
            plaintext,
            hash,
            user_id,
            expiry: now + ttl,
            scope,
        })
    }

    /// Valid iff the scope matches and the expiry is strictly in the future.
    pub fn is_active(&self, scope: Scope, now: DateTime<Utc>) -> bool {
        self.scope == scope && self.expiry > now
    }
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Format gate applied before any store lookup.
pub fn validate_plaintext(plaintext: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.check(!plaintext.is_empty(), "token", "must be provided");
    errors.check(
        plaintext.len() == TOKEN_LENGTH,
        "token",
        "must be 26 bytes long",
    );
    errors.check(
        plaintext.bytes().all(is_base32_symbol),
        "token",
        "must be base-32 encoded",
    );
    errors.into_result()
}

/// RFC 4648 base-32 alphabet, upper case.
fn is_base32_symbol(b: u8) -> bool {
    b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)
}

/// Lifetimes handed out per scope. Policy defaults, not protocol constants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    pub activation_ttl: Duration,
    pub authentication_ttl: Duration,
}

impl TokenPolicy {
    pub fn ttl_for(&self, scope: Scope) -> Duration {
        match scope {
            Scope::Activation => self.activation_ttl,
            Scope::Authentication => self.authentication_ttl,
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            activation_ttl: Duration::hours(72),
            authentication_ttl: Duration::hours(24),
        }
    }
}

/// Generates tokens and persists their hashes.
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn AccountStore>,
    policy: TokenPolicy,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn AccountStore>, policy: TokenPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn issue(
        &self,
        user_id: UserId,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Token, TokenError> {
        let token = Token::generate(user_id, self.policy.ttl_for(scope), scope, now)?;
        self.store.insert_token(&token).await?;
        tracing::debug!(user_id = %user_id, scope = %scope, expiry = %token.expiry, "token issued");
        Ok(token)
    }
}
