//! Change scripts - the executable payload of a migration.
//!
//! The engine never interprets script content. Each script is an opaque
//! capability with a single contract: run yourself against the transaction
//! you are given. Raw SQL batches and programmatic changes are the two
//! variants.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::MigrateResult;

/// The minimal transaction surface a change script executes against.
///
/// Backends hand an implementation to [`ChangeScript::apply`]; everything a
/// script does goes through this seam so that script execution and history
/// bookkeeping share one transaction.
#[async_trait::async_trait]
pub trait SchemaTransaction: Send {
    /// Execute a batch of SQL statements within the transaction.
    async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()>;
}

/// A programmatic schema change.
///
/// Used when a migration cannot be expressed as a static SQL batch, e.g.
/// data backfills computed in code.
#[async_trait::async_trait]
pub trait ProceduralChange: Send + Sync {
    /// Stable content fingerprint; feeds the checksum recorded in history.
    fn fingerprint(&self) -> String;

    /// Apply the change within the given transaction.
    async fn apply(&self, txn: &mut dyn SchemaTransaction) -> MigrateResult<()>;
}

/// A single directional change script.
#[derive(Clone)]
pub enum ChangeScript {
    /// A raw SQL batch, executed verbatim.
    Sql(String),
    /// A procedural change applied through the transaction surface.
    Procedural(Arc<dyn ProceduralChange>),
}

impl ChangeScript {
    /// Create a raw SQL script.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql(sql.into())
    }

    /// Create a procedural script.
    pub fn procedural(change: impl ProceduralChange + 'static) -> Self {
        Self::Procedural(Arc::new(change))
    }

    /// SHA-256 checksum (hex) of the script content.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::Sql(sql) => hasher.update(sql.as_bytes()),
            Self::Procedural(change) => hasher.update(change.fingerprint().as_bytes()),
        }
        hex::encode(hasher.finalize())
    }

    /// Run the script against the given transaction.
    pub async fn apply(&self, txn: &mut dyn SchemaTransaction) -> MigrateResult<()> {
        match self {
            Self::Sql(sql) => txn.execute_batch(sql).await,
            Self::Procedural(change) => change.apply(txn).await,
        }
    }
}

impl fmt::Debug for ChangeScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Self::Procedural(change) => f
                .debug_tuple("Procedural")
                .field(&change.fingerprint())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingTransaction {
        statements: Vec<String>,
    }

    #[async_trait::async_trait]
    impl SchemaTransaction for RecordingTransaction {
        async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()> {
            self.statements.push(sql.to_string());
            Ok(())
        }
    }

    struct Backfill;

    #[async_trait::async_trait]
    impl ProceduralChange for Backfill {
        fn fingerprint(&self) -> String {
            "backfill-v1".to_string()
        }

        async fn apply(&self, txn: &mut dyn SchemaTransaction) -> MigrateResult<()> {
            txn.execute_batch("UPDATE users SET active = TRUE").await
        }
    }

    #[tokio::test]
    async fn test_sql_script_executes_verbatim() {
        let script = ChangeScript::sql("CREATE TABLE users (id BIGINT);");
        let mut txn = RecordingTransaction {
            statements: Vec::new(),
        };

        script.apply(&mut txn).await.unwrap();
        assert_eq!(txn.statements, vec!["CREATE TABLE users (id BIGINT);"]);
    }

    #[tokio::test]
    async fn test_procedural_script_runs_through_transaction() {
        let script = ChangeScript::procedural(Backfill);
        let mut txn = RecordingTransaction {
            statements: Vec::new(),
        };

        script.apply(&mut txn).await.unwrap();
        assert_eq!(txn.statements, vec!["UPDATE users SET active = TRUE"]);
    }

    #[test]
    fn test_checksum_is_stable() {
        let a = ChangeScript::sql("CREATE TABLE users ();");
        let b = ChangeScript::sql("CREATE TABLE users ();");
        let c = ChangeScript::sql("DROP TABLE users;");

        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
        // SHA-256 hex
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn test_procedural_checksum_uses_fingerprint() {
        let a = ChangeScript::procedural(Backfill);
        let b = ChangeScript::procedural(Backfill);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_debug_does_not_require_script_body() {
        let script = ChangeScript::procedural(Backfill);
        assert!(format!("{:?}", script).contains("backfill-v1"));
    }
}
