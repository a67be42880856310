use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bankapi_core::UserId;

/// Signed-claim payload (HS256).
///
/// Timestamps are JWT numeric dates (seconds since the epoch). `aud` is the
/// same value as `iss`: the API only accepts claims it minted itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user id, as a decimal string.
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(user_id: UserId, issuer: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            aud: issuer.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn user_id(&self) -> Result<UserId, TokenValidationError> {
        self.sub
            .parse()
            .map_err(|_| TokenValidationError::InvalidSubject)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token was not issued for this service")]
    WrongIssuer,

    #[error("token subject is not a user id")]
    InvalidSubject,

    /// Bad signature, wrong algorithm or undecodable payload.
    #[error("malformed or tampered token: {0}")]
    Malformed(String),
}

/// Deterministically validate decoded claims against `issuer` at `now`.
///
/// Signature checking happens before this, in [`Hs256Jwt::validate`].
pub fn validate_claims(
    claims: &JwtClaims,
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.iss != issuer || claims.aud != issuer {
        return Err(TokenValidationError::WrongIssuer);
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Verifies a bearer value and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// A minted signed claim, as handed to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SignedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// HS256 signer/validator over a shared secret injected at startup.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<SignedToken, TokenValidationError> {
        let claims = JwtClaims::new(user_id, &self.issuer, now, self.ttl);
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        Ok(SignedToken {
            token,
            expiry: now + self.ttl,
        })
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        // Time and audience checks run in `validate_claims` against the
        // caller's clock, not the library's.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, &self.issuer, now)?;
        Ok(data.claims)
    }
}
