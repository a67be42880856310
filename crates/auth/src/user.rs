//! User accounts.
//!
//! # Invariants
//! - `id` is assigned by the store at creation and never changes.
//! - `email` is unique across accounts (enforced by the store).
//! - `version` increments exactly once per successful update; a write carrying
//!   a stale version is rejected, never merged.
//! - Only the password hash is ever held here.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use bankapi_core::{UserId, ValidationErrors, Versioned};

use crate::password::{self, PasswordHash};

const MAX_USERNAME_BYTES: usize = 500;

/// A persisted user account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    #[serde(rename = "name")]
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    pub activated: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Versioned for User {
    fn version(&self) -> i32 {
        self.version
    }
}

/// A user that has not been persisted yet (no id, timestamp or version).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: PasswordHash,
    pub activated: bool,
}

/// Registration input, as submitted by the client.
#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    #[serde(deserialize_with = "password::deserialize_secret")]
    pub password: SecretString,
}

impl RegisterUser {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_username(&mut errors, &self.name);
        validate_email(&mut errors, &self.email);
        password::validate_plaintext(&mut errors, &self.password);
        errors.into_result()
    }
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "password::deserialize_optional_secret")]
    pub password: Option<SecretString>,
    /// Version the client last saw; `None` skips the check.
    pub version: Option<i32>,
}

impl UpdateProfile {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            validate_username(&mut errors, name);
        }
        if let Some(email) = &self.email {
            validate_email(&mut errors, email);
        }
        if let Some(password) = &self.password {
            password::validate_plaintext(&mut errors, password);
        }
        errors.into_result()
    }
}

/// Lowercase and trim an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_username(errors: &mut ValidationErrors, name: &str) {
    errors.check(!name.trim().is_empty(), "name", "must be provided");
    errors.check(
        name.len() <= MAX_USERNAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
}

pub fn validate_email(errors: &mut ValidationErrors, email: &str) {
    let email = email.trim();
    errors.check(!email.is_empty(), "email", "must be provided");
    errors.check(looks_like_email(email), "email", "must be a valid email address");
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
