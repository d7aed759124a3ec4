//! Migration definitions and the sources that load them.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::change::ChangeScript;
use crate::error::{MigrateResult, MigrationError};

/// A single versioned schema change.
///
/// Immutable once loaded; the source loads the full set once per run.
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    /// Totally ordered version key, typically a `YYYYMMDDHHMMSS` timestamp.
    pub version: i64,
    /// Human readable name.
    pub name: String,
    /// Script executed when applying.
    pub up: ChangeScript,
    /// Script executed when reverting. `None` marks the migration
    /// irreversible.
    pub down: Option<ChangeScript>,
}

impl MigrationDefinition {
    /// Create a new definition.
    pub fn new(version: i64, name: impl Into<String>, up: ChangeScript) -> Self {
        Self {
            version,
            name: name.into(),
            up,
            down: None,
        }
    }

    /// Set the down script.
    pub fn with_down(mut self, down: ChangeScript) -> Self {
        self.down = Some(down);
        self
    }

    /// Whether this migration can be reverted.
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    /// Checksum of the up script; recorded in history when applied.
    pub fn checksum(&self) -> String {
        self.up.checksum()
    }

    /// The full `version_name` identifier.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }
}

/// An ordered collection of migration definitions.
#[async_trait::async_trait]
pub trait MigrationSource: Send + Sync {
    /// Load the full validated definition set, ascending by version.
    async fn load(&self) -> MigrateResult<Vec<MigrationDefinition>>;
}

/// Sort a definition set by version and reject duplicates.
///
/// Ties are a load-time error; there is no silent "last wins".
pub fn validate(mut definitions: Vec<MigrationDefinition>) -> MigrateResult<Vec<MigrationDefinition>> {
    definitions.sort_by_key(|d| d.version);

    for pair in definitions.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrationError::load(format!(
                "duplicate version {}: '{}' and '{}'",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }
    }

    Ok(definitions)
}

/// An in-memory source for migration sets defined in code.
pub struct StaticSource {
    definitions: Vec<MigrationDefinition>,
}

impl StaticSource {
    /// Create a source from a definition set.
    pub fn new(definitions: Vec<MigrationDefinition>) -> Self {
        Self { definitions }
    }
}

#[async_trait::async_trait]
impl MigrationSource for StaticSource {
    async fn load(&self) -> MigrateResult<Vec<MigrationDefinition>> {
        validate(self.definitions.clone())
    }
}

/// A filesystem source.
///
/// Migrations live in per-version directories:
///
/// ```text
/// migrations/
/// ├── 20240101120000_create_users/
/// │   ├── up.sql
/// │   └── down.sql
/// └── 20240102090000_add_email/
///     └── up.sql          # no down.sql: irreversible
/// ```
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the migrations directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scaffold a new timestamped migration directory with template
    /// `up.sql` and `down.sql` files.
    pub async fn generate(&self, name: &str) -> MigrateResult<PathBuf> {
        let version = Utc::now().format("%Y%m%d%H%M%S");
        let dir_name = format!("{}_{}", version, name);
        let migration_dir = self.dir.join(&dir_name);

        tokio::fs::create_dir_all(&migration_dir).await?;
        tokio::fs::write(migration_dir.join("up.sql"), "-- Apply the change\n").await?;
        tokio::fs::write(migration_dir.join("down.sql"), "-- Revert the change\n").await?;

        info!(migration = %dir_name, "generated migration");
        Ok(migration_dir)
    }

    /// Read one migration directory.
    async fn read_migration(&self, path: &Path) -> MigrateResult<MigrationDefinition> {
        let dir_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::load(format!("invalid path: {}", path.display())))?;

        let (version, name) = parse_dir_name(dir_name)?;

        let up_path = path.join("up.sql");
        if !up_path.exists() {
            return Err(MigrationError::load(format!(
                "migration '{}' is missing up.sql",
                dir_name
            )));
        }
        let up_sql = tokio::fs::read_to_string(&up_path).await?;

        let down_path = path.join("down.sql");
        let down = if down_path.exists() {
            Some(ChangeScript::sql(
                tokio::fs::read_to_string(&down_path).await?,
            ))
        } else {
            None
        };

        Ok(MigrationDefinition {
            version,
            name,
            up: ChangeScript::sql(up_sql),
            down,
        })
    }
}

#[async_trait::async_trait]
impl MigrationSource for DirectorySource {
    async fn load(&self) -> MigrateResult<Vec<MigrationDefinition>> {
        let mut definitions = Vec::new();

        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "migrations directory does not exist");
            return Ok(definitions);
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Plain files (README, resolutions) are not migrations.
            if path.is_dir() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            definitions.push(self.read_migration(&path).await?);
        }

        debug!(count = definitions.len(), "loaded migrations");
        validate(definitions)
    }
}

/// Parse a migration directory name into `(version, name)`.
///
/// Expected format: `<VERSION>_<name>` with a numeric version.
fn parse_dir_name(dir_name: &str) -> MigrateResult<(i64, String)> {
    let parts: Vec<&str> = dir_name.splitn(2, '_').collect();

    if parts.len() != 2 || parts[1].is_empty() {
        return Err(MigrationError::load(format!(
            "invalid migration directory name '{}': expected VERSION_NAME",
            dir_name
        )));
    }

    let version: i64 = parts[0].parse().map_err(|_| {
        MigrationError::load(format!(
            "invalid migration version '{}' in '{}': expected a numeric timestamp",
            parts[0], dir_name
        ))
    })?;

    Ok((version, parts[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn def(version: i64, name: &str) -> MigrationDefinition {
        MigrationDefinition::new(version, name, ChangeScript::sql("SELECT 1"))
    }

    #[test]
    fn test_parse_dir_name() {
        let (version, name) = parse_dir_name("20240101120000_create_users").unwrap();
        assert_eq!(version, 20240101120000);
        assert_eq!(name, "create_users");
    }

    #[test]
    fn test_parse_dir_name_keeps_underscores_in_name() {
        let (_, name) = parse_dir_name("1_add_email_column").unwrap();
        assert_eq!(name, "add_email_column");
    }

    #[test]
    fn test_parse_dir_name_invalid() {
        assert!(parse_dir_name("no-separator").is_err());
        assert!(parse_dir_name("abc_test").is_err());
        assert!(parse_dir_name("123_").is_err());
    }

    #[test]
    fn test_validate_sorts_ascending() {
        let defs = validate(vec![def(3, "c"), def(1, "a"), def(2, "b")]).unwrap();
        let versions: Vec<i64> = defs.iter().map(|d| d.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_rejects_duplicate_versions() {
        let err = validate(vec![def(1, "a"), def(1, "b")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate version 1"));
        assert!(msg.contains("'a'"));
        assert!(msg.contains("'b'"));
    }

    #[test]
    fn test_definition_reversibility() {
        let irreversible = def(1, "a");
        assert!(!irreversible.is_reversible());

        let reversible = def(1, "a").with_down(ChangeScript::sql("SELECT 2"));
        assert!(reversible.is_reversible());
    }

    #[test]
    fn test_definition_full_name() {
        assert_eq!(def(20240101120000, "create_users").full_name(), "20240101120000_create_users");
    }

    #[tokio::test]
    async fn test_static_source_validates_on_load() {
        let source = StaticSource::new(vec![def(2, "b"), def(2, "dup")]);
        assert!(matches!(
            source.load().await,
            Err(MigrationError::Load(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_source_missing_dir_is_empty() {
        let source = DirectorySource::new("/nonexistent/migrations");
        assert!(source.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_source_loads_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "20240102090000_add_email", "ALTER TABLE users ADD email TEXT;", None);
        write_migration(
            tmp.path(),
            "20240101120000_create_users",
            "CREATE TABLE users ();",
            Some("DROP TABLE users;"),
        );
        // A stray file must be ignored.
        std::fs::write(tmp.path().join("README.md"), "notes").unwrap();

        let source = DirectorySource::new(tmp.path());
        let defs = source.load().await.unwrap();

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].version, 20240101120000);
        assert_eq!(defs[0].name, "create_users");
        assert!(defs[0].is_reversible());
        assert_eq!(defs[1].version, 20240102090000);
        assert!(!defs[1].is_reversible());
    }

    #[tokio::test]
    async fn test_directory_source_missing_up_sql_fails() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("20240101120000_empty")).unwrap();

        let source = DirectorySource::new(tmp.path());
        let err = source.load().await.unwrap_err();
        assert!(err.to_string().contains("missing up.sql"));
    }

    #[tokio::test]
    async fn test_directory_source_malformed_name_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "not-a-migration", "SELECT 1;", None);

        let source = DirectorySource::new(tmp.path());
        assert!(matches!(
            source.load().await,
            Err(MigrationError::Load(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_scaffolds_migration() {
        let tmp = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(tmp.path());

        let path = source.generate("create_users").await.unwrap();

        assert!(path.join("up.sql").exists());
        assert!(path.join("down.sql").exists());
        let defs = source.load().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "create_users");
    }

    fn write_migration(root: &Path, dir_name: &str, up: &str, down: Option<&str>) {
        let dir = root.join(dir_name);
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("up.sql"), up).unwrap();
        if let Some(down) = down {
            std::fs::write(dir.join("down.sql"), down).unwrap();
        }
    }
}
