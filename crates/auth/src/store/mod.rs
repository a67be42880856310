//! Account store contract and the in-memory implementation.
//!
//! The engine never talks to a database directly. Everything it needs from
//! persistence is expressed by [`AccountStore`]; `bankapi-infra` provides the
//! Postgres implementation and the timeout decorator.

pub mod in_memory;
pub mod r#trait;

#[cfg(test)]
pub(crate) mod testing;

pub use in_memory::InMemoryAccountStore;
pub use r#trait::{AccountStore, StoreError};
