//! `bankapi-auth` — authentication/authorization engine.
//!
//! Password hashing, scoped opaque tokens, signed claims, request
//! authentication and ordered authorization gates. This crate is decoupled
//! from HTTP; persistence is reached only through [`AccountStore`].

pub mod accounts;
pub mod authorize;
pub mod claims;
pub mod identity;
pub mod notifier;
pub mod password;
pub mod permissions;
pub mod resolver;
pub mod store;
pub mod token;
pub mod user;

pub use accounts::{AccountError, AccountService, Credentials, Registration};
pub use authorize::{AuthzError, Gate, GateChain, authorize};
pub use claims::{Hs256Jwt, JwtClaims, JwtValidator, SignedToken, TokenValidationError, validate_claims};
pub use identity::Identity;
pub use notifier::ActivationNotifier;
pub use password::{PasswordError, PasswordHash, PasswordHasher};
pub use permissions::{Permission, Permissions};
pub use resolver::{AuthError, AuthMode, Authenticator};
pub use store::{AccountStore, InMemoryAccountStore, StoreError};
pub use token::{Scope, Token, TokenError, TokenHash, TokenIssuer, TokenPolicy};
pub use user::{NewUser, RegisterUser, UpdateProfile, User};
