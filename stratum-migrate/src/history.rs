//! Applied-migration bookkeeping.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;
use crate::source::MigrationDefinition;

/// A record of a successfully applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// Checksum of the up script at the time it was applied.
    pub checksum: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// A checksum discrepancy between a loaded definition and its applied record.
///
/// Already-applied history is immutable; drift is reported for operator
/// awareness and only blocks a run when the migrator is configured to fail
/// on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftWarning {
    /// Version of the drifted migration.
    pub version: i64,
    /// Checksum recorded when the migration was applied.
    pub recorded: String,
    /// Checksum of the definition as loaded now.
    pub actual: String,
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migration {} changed after being applied: recorded checksum {}, current {}",
            self.version, self.recorded, self.actual
        )
    }
}

/// Durable bookkeeping of applied versions, stored in the target database.
///
/// The writes (`record applied` / `record reverted`) are not on this trait:
/// they happen inside the executor's transaction together with the script
/// (see [`crate::executor::ChangeExecutor`]) so a crash between script
/// execution and bookkeeping cannot leave the two inconsistent.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Idempotently create the bookkeeping table if absent. Safe to call
    /// concurrently under the run lock.
    async fn ensure_schema(&self) -> MigrateResult<()>;

    /// All applied records, ascending by version.
    async fn list_applied(&self) -> MigrateResult<Vec<AppliedRecord>>;
}

/// Current schema version: the highest applied version, or `None` for an
/// empty history.
pub fn current_version(applied: &[AppliedRecord]) -> Option<i64> {
    applied.iter().map(|r| r.version).max()
}

/// Compare loaded definitions against history and collect drift.
pub fn detect_drift(
    definitions: &[MigrationDefinition],
    applied: &[AppliedRecord],
) -> Vec<DriftWarning> {
    let mut warnings = Vec::new();

    for record in applied {
        if let Some(def) = definitions.iter().find(|d| d.version == record.version) {
            let actual = def.checksum();
            if actual != record.checksum {
                warnings.push(DriftWarning {
                    version: record.version,
                    recorded: record.checksum.clone(),
                    actual,
                });
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeScript;

    fn record(version: i64, checksum: &str) -> AppliedRecord {
        AppliedRecord {
            version,
            name: format!("m{}", version),
            checksum: checksum.to_string(),
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_current_version() {
        assert_eq!(current_version(&[]), None);
        assert_eq!(
            current_version(&[record(1, "a"), record(3, "c"), record(2, "b")]),
            Some(3)
        );
    }

    #[test]
    fn test_detect_drift_flags_changed_scripts() {
        let def = MigrationDefinition::new(1, "create_users", ChangeScript::sql("CREATE TABLE users ();"));
        let unchanged = record(1, &def.checksum());
        assert!(detect_drift(std::slice::from_ref(&def), &[unchanged]).is_empty());

        let changed = record(1, "stale-checksum");
        let drift = detect_drift(&[def], &[changed]);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].version, 1);
        assert_eq!(drift[0].recorded, "stale-checksum");
    }

    #[test]
    fn test_detect_drift_ignores_records_without_definitions() {
        // An applied record with no matching definition is not drift.
        let drift = detect_drift(&[], &[record(1, "whatever")]);
        assert!(drift.is_empty());
    }

    #[test]
    fn test_drift_warning_display() {
        let warning = DriftWarning {
            version: 7,
            recorded: "aaa".to_string(),
            actual: "bbb".to_string(),
        };
        let msg = warning.to_string();
        assert!(msg.contains("migration 7"));
        assert!(msg.contains("aaa"));
        assert!(msg.contains("bbb"));
    }
}
