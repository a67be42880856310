pub mod postgres;
pub mod timeout;

pub use postgres::PostgresAccountStore;
pub use timeout::{DEFAULT_STORE_TIMEOUT, TimeoutStore};
