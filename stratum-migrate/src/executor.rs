//! Transactional script execution seam.

use crate::error::MigrateResult;
use crate::history::HistoryStore;
use crate::lock::LockManager;
use crate::source::MigrationDefinition;

/// Executes one migration's script and its history bookkeeping atomically.
///
/// Contract for both methods: open one transaction, run the script through
/// [`ChangeScript::apply`], write the corresponding history row in that same
/// transaction, commit. Any failure rolls the whole transaction back and
/// surfaces as [`MigrationError::ScriptExecution`].
///
/// [`ChangeScript::apply`]: crate::change::ChangeScript::apply
/// [`MigrationError::ScriptExecution`]: crate::error::MigrationError::ScriptExecution
#[async_trait::async_trait]
pub trait ChangeExecutor: Send + Sync {
    /// Run the up script and insert the applied record, in one transaction.
    async fn apply(&self, definition: &MigrationDefinition) -> MigrateResult<()>;

    /// Run the down script and delete the applied record, in one transaction.
    async fn revert(&self, definition: &MigrationDefinition) -> MigrateResult<()>;
}

/// Everything the migrator needs from a database backend.
pub trait MigrationBackend: HistoryStore + LockManager + ChangeExecutor {}

impl<T: HistoryStore + LockManager + ChangeExecutor> MigrationBackend for T {}
