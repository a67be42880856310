//! `bankapi-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod validation;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::UserId;
pub use validation::ValidationErrors;
pub use version::{ExpectedVersion, Versioned};
