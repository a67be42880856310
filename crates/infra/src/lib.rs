//! Infrastructure layer: account store implementations and collaborators.

pub mod notifier;
pub mod store;

pub use notifier::LogNotifier;
pub use store::{DEFAULT_STORE_TIMEOUT, PostgresAccountStore, TimeoutStore};
