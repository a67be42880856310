//! Process-wide tracing setup shared by binaries and tests.

/// Initialize process-wide tracing for the named deployment environment:
/// JSON lines in production-like environments, pretty output in development.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(env: &str) {
    tracing::init(LogFormat::for_env(env));
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::LogFormat;
