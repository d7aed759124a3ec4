//! Cross-process serialization of migration runs.
//!
//! Concurrency within a run does not exist: migrations execute strictly
//! sequentially. The only concurrency concern is two deployment processes
//! racing to migrate the same database, and that is resolved here.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::MigrateResult;

/// Ephemeral proof of exclusive ownership of the migration critical section.
///
/// Created at run start, destroyed at run end; never persisted beyond a
/// single run's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Unique holder identity for this run.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl LockToken {
    /// Create a token for the given holder, acquired now.
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            acquired_at: Utc::now(),
        }
    }
}

/// Ensures at most one migration run executes against a database at a time.
#[async_trait::async_trait]
pub trait LockManager: Send + Sync {
    /// Block up to `timeout` for the run lock.
    ///
    /// Fails with [`MigrationError::LockTimeout`] when another run holds the
    /// lock past the deadline, and with [`MigrationError::LockUnavailable`]
    /// when the locking primitive itself cannot be reached.
    ///
    /// [`MigrationError::LockTimeout`]: crate::error::MigrationError::LockTimeout
    /// [`MigrationError::LockUnavailable`]: crate::error::MigrationError::LockUnavailable
    async fn acquire(&self, timeout: Duration) -> MigrateResult<LockToken>;

    /// Release the lock.
    ///
    /// Idempotent: releasing a lock that was already cleared (e.g. a stale
    /// lock force-cleared by another process) is a no-op.
    async fn release(&self, token: LockToken) -> MigrateResult<()>;
}
