//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Malformed or duplicate migration definitions. Raised while loading the
    /// source, before any database interaction.
    #[error("failed to load migrations: {0}")]
    Load(String),

    /// Another run held the lock past the deadline.
    #[error("timed out waiting for the migration lock after {waited_ms}ms")]
    LockTimeout {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The locking primitive could not be reached.
    #[error("migration lock unavailable: {0}")]
    LockUnavailable(String),

    /// A migration script failed. The in-flight transaction was rolled back;
    /// migrations committed earlier in the same run remain applied.
    #[error(
        "migration {version} ('{name}') failed after {applied_before} migration(s) \
         committed in this run: {message}"
    )]
    ScriptExecution {
        /// Version of the failing migration.
        version: i64,
        /// Name of the failing migration.
        name: String,
        /// How many migrations from this run committed before the failure.
        applied_before: usize,
        /// Underlying database driver error text.
        message: String,
    },

    /// Attempted to revert a migration that has no down script.
    #[error("migration {version} ('{name}') is irreversible: no down script")]
    Irreversible {
        /// Version of the migration.
        version: i64,
        /// Name of the migration.
        name: String,
    },

    /// `down` was called against an empty history.
    #[error("nothing to revert: no migrations have been applied")]
    NothingToRevert,

    /// A pending migration sorts below the current schema version; applying it
    /// would punch a hole in the history.
    #[error(
        "migration {version} is older than the current schema version {current}; \
         refusing out-of-order apply"
    )]
    OutOfOrder {
        /// Version of the out-of-order pending migration.
        version: i64,
        /// Highest applied version.
        current: i64,
    },

    /// Checksum drift promoted to a hard failure by configuration.
    #[error(
        "migration {version} changed after being applied: recorded checksum {recorded}, \
         current {actual}"
    )]
    Drift {
        /// Version of the drifted migration.
        version: i64,
        /// Checksum recorded when the migration was applied.
        recorded: String,
        /// Checksum of the definition as loaded now.
        actual: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database operation error outside script execution.
    #[error("database error: {0}")]
    Database(String),

    /// File system error while reading migration sources.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Create a load error.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a lock unavailable error.
    pub fn lock_unavailable(msg: impl Into<String>) -> Self {
        Self::LockUnavailable(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Lock contention is retryable; everything else needs operator
    /// intervention before a rerun can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::LockUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_execution_display() {
        let err = MigrationError::ScriptExecution {
            version: 20240102120000,
            name: "add_email".to_string(),
            applied_before: 2,
            message: "column already exists".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("20240102120000"));
        assert!(msg.contains("add_email"));
        assert!(msg.contains("2 migration(s)"));
        assert!(msg.contains("column already exists"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::LockTimeout { waited_ms: 5000 }.is_recoverable());
        assert!(MigrationError::lock_unavailable("connection refused").is_recoverable());
        assert!(!MigrationError::NothingToRevert.is_recoverable());
        assert!(!MigrationError::load("duplicate version").is_recoverable());
    }

    #[test]
    fn test_out_of_order_display() {
        let err = MigrationError::OutOfOrder {
            version: 2,
            current: 3,
        };
        assert!(err.to_string().contains("out-of-order"));
    }
}
