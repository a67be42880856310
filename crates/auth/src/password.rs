//! Credential hashing.
//!
//! Passwords are hashed with bcrypt (salted, adaptive). Plaintext only ever
//! lives in a [`SecretString`] for the duration of a request and is never
//! stored, logged, or serialized.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use bankapi_core::ValidationErrors;

/// Lowest and highest work factors accepted by bcrypt.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// bcrypt only considers the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_PASSWORD_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt cost {0} outside of {MIN_COST}..={MAX_COST}")]
    InvalidCost(u32),

    /// Hash primitive or stored-hash failure. Never a plain mismatch.
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Stored one-way password credential (bcrypt modular crypt string).
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a hash loaded from storage.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare a candidate plaintext against this hash.
    ///
    /// `Ok(false)` is an ordinary mismatch; `Err` means the verification
    /// mechanism itself failed (e.g. a corrupt stored hash).
    pub fn matches(&self, plaintext: &SecretString) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(plaintext.expose_secret(), &self.0)?)
    }
}

impl core::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Produces password hashes at a configured work factor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, plaintext: &SecretString) -> Result<PasswordHash, PasswordError> {
        let hash = bcrypt::hash(plaintext.expose_secret(), self.cost)?;
        Ok(PasswordHash(hash))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Check a candidate plaintext password before hashing it.
pub fn validate_plaintext(errors: &mut ValidationErrors, plaintext: &SecretString) {
    let len = plaintext.expose_secret().len();
    errors.check(len > 0, "password", "must be provided");
    errors.check(
        len >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    errors.check(
        len <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Deserialize a plaintext password straight into a [`SecretString`].
pub fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Like [`deserialize_secret`], for optional fields.
pub fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|value| value.map(SecretString::from))
}
