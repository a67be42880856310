//! Optimistic concurrency primitives.

use crate::error::{DomainError, DomainResult};

/// A record carrying a monotonically increasing version counter.
///
/// The version increments exactly once per successful write. Writers submit
/// the version they loaded; the store rejects the write when it is stale.
pub trait Versioned {
    fn version(&self) -> i32;
}

/// Optimistic concurrency expectation for a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (the caller accepts whatever is current).
    Any,
    /// Require the record to be at an exact version.
    Exact(i32),
}

impl ExpectedVersion {
    pub fn matches(self, actual: i32) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: i32) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<Option<i32>> for ExpectedVersion {
    fn from(value: Option<i32>) -> Self {
        value.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }
}
