//! PostgreSQL migration backend.
//!
//! Implements the engine's three seams against one database:
//! - [`HistoryStore`]: a `_stratum_migrations` table keyed by version
//! - [`LockManager`]: a single-row lock table with conservative stale-lock
//!   clearing
//! - [`ChangeExecutor`]: script execution and history bookkeeping in one
//!   transaction

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stratum_migrate::{
    AppliedRecord, ChangeExecutor, HistoryStore, LockManager, LockToken, MigrateResult,
    MigrationDefinition, MigrationError, SchemaTransaction,
};

use crate::config::PgConfig;

/// Default name of the history table.
pub const DEFAULT_HISTORY_TABLE: &str = "_stratum_migrations";

/// Default name of the lock table.
pub const DEFAULT_LOCK_TABLE: &str = "_stratum_lock";

/// Lock polling and staleness policy.
#[derive(Debug, Clone)]
pub struct LockSettings {
    /// How often to retry a contended lock.
    pub poll_interval: Duration,
    /// Age past which a lock is considered abandoned and force-cleared.
    /// Conservative on purpose: false stale-detection causes concurrent-run
    /// corruption.
    pub stale_after: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

/// A PostgreSQL-backed migration backend.
pub struct PgBackend {
    pool: Pool,
    history_table: String,
    lock_table: String,
    lock: LockSettings,
}

/// Build the connection pool for a backend.
///
/// Configuring a timeout on the pool requires naming a runtime, so the
/// runtime is part of this builder chain and not optional.
fn build_pool(config: &PgConfig) -> MigrateResult<Pool> {
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(config.to_pg_config(), NoTls, mgr_config);

    // The run owns the connection; a second slot covers lock bookkeeping.
    Pool::builder(mgr)
        .max_size(2)
        .create_timeout(Some(config.connect_timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| MigrationError::config(format!("failed to create pool: {}", e)))
}

impl PgBackend {
    /// Connect to the database described by the configuration.
    pub async fn connect(config: &PgConfig) -> MigrateResult<Self> {
        let pool = build_pool(config)?;

        info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            "connected migration backend"
        );

        Ok(Self {
            pool,
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            lock: LockSettings::default(),
        })
    }

    /// Set the history table name.
    pub fn with_history_table(mut self, name: impl Into<String>) -> Self {
        self.history_table = name.into();
        self
    }

    /// Set the lock table name.
    pub fn with_lock_table(mut self, name: impl Into<String>) -> Self {
        self.lock_table = name.into();
        self
    }

    /// Set the lock polling and staleness policy.
    pub fn with_lock_settings(mut self, settings: LockSettings) -> Self {
        self.lock = settings;
        self
    }

    /// Get the history table name.
    pub fn history_table(&self) -> &str {
        &self.history_table
    }

    async fn client(&self) -> MigrateResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrationError::database(e.to_string()))
    }

    fn history_init_sql(&self) -> String {
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    version BIGINT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    checksum VARCHAR(64) NOT NULL,
    applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);
"#,
            table = self.history_table
        )
    }

    fn lock_init_sql(&self) -> String {
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    id SMALLINT PRIMARY KEY,
    holder VARCHAR(64) NOT NULL,
    locked_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);
"#,
            table = self.lock_table
        )
    }
}

/// Whether a failed `CREATE TABLE IF NOT EXISTS` lost a bootstrap race.
///
/// Unlocked callers (e.g. `status`) can race the bootstrap; the loser of the
/// catalog race sees a duplicate-object error while the table exists anyway.
fn is_bootstrap_race(code: Option<&SqlState>) -> bool {
    code == Some(&SqlState::UNIQUE_VIOLATION) || code == Some(&SqlState::DUPLICATE_TABLE)
}

#[async_trait::async_trait]
impl HistoryStore for PgBackend {
    async fn ensure_schema(&self) -> MigrateResult<()> {
        let client = self.client().await?;
        match client.batch_execute(&self.history_init_sql()).await {
            Ok(()) => Ok(()),
            Err(e) if is_bootstrap_race(e.code()) => Ok(()),
            Err(e) => Err(MigrationError::database(e.to_string())),
        }
    }

    async fn list_applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT version, name, checksum, applied_at FROM {} ORDER BY version",
            self.history_table
        );
        let rows = client
            .query(&sql, &[])
            .await
            .map_err(|e| MigrationError::database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| AppliedRecord {
                version: row.get::<_, i64>("version"),
                name: row.get::<_, String>("name"),
                checksum: row.get::<_, String>("checksum"),
                applied_at: row.get::<_, DateTime<Utc>>("applied_at"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl LockManager for PgBackend {
    async fn acquire(&self, timeout: Duration) -> MigrateResult<LockToken> {
        let start = Instant::now();
        let holder = format!("{}-{}", std::process::id(), Uuid::new_v4());

        // The lock table is the locking primitive itself, so it bootstraps
        // here rather than in ensure_schema (which runs under the lock).
        let client = self
            .client()
            .await
            .map_err(|e| MigrationError::lock_unavailable(e.to_string()))?;
        match client.batch_execute(&self.lock_init_sql()).await {
            Ok(()) => {}
            Err(e) if is_bootstrap_race(e.code()) => {}
            Err(e) => return Err(MigrationError::lock_unavailable(e.to_string())),
        }

        let insert = format!(
            "INSERT INTO {} (id, holder) VALUES (1, $1) ON CONFLICT (id) DO NOTHING",
            self.lock_table
        );
        let clear_stale = format!(
            "DELETE FROM {} WHERE id = 1 AND locked_at < NOW() - INTERVAL '{} seconds'",
            self.lock_table,
            self.lock.stale_after.as_secs()
        );

        loop {
            let inserted = client
                .execute(&insert, &[&holder])
                .await
                .map_err(|e| MigrationError::lock_unavailable(e.to_string()))?;
            if inserted == 1 {
                debug!(holder = %holder, "acquired migration lock");
                return Ok(LockToken::new(holder));
            }

            // Stale-lock detection: only clear holders past the threshold,
            // then contend again on the next iteration.
            let cleared = client
                .execute(&clear_stale, &[])
                .await
                .map_err(|e| MigrationError::lock_unavailable(e.to_string()))?;
            if cleared > 0 {
                warn!(stale_after_secs = self.lock.stale_after.as_secs(), "force-cleared a stale migration lock");
            }

            match next_lock_step(cleared > 0, start.elapsed(), timeout, self.lock.poll_interval) {
                LockStep::TimedOut => {
                    return Err(MigrationError::LockTimeout {
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
                LockStep::Retry => {}
                LockStep::Sleep(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    async fn release(&self, token: LockToken) -> MigrateResult<()> {
        let client = self.client().await?;
        let sql = format!(
            "DELETE FROM {} WHERE id = 1 AND holder = $1",
            self.lock_table
        );
        let deleted = client
            .execute(&sql, &[&token.holder])
            .await
            .map_err(|e| MigrationError::database(e.to_string()))?;
        if deleted == 0 {
            // Already cleared, e.g. by stale-lock detection after a crash.
            debug!(holder = %token.holder, "migration lock was already released");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeExecutor for PgBackend {
    async fn apply(&self, definition: &MigrationDefinition) -> MigrateResult<()> {
        let mut client = self.client().await?;
        let txn = client
            .transaction()
            .await
            .map_err(|e| MigrationError::database(e.to_string()))?;

        let checksum = definition.checksum();
        let insert = format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            self.history_table
        );

        let result = async {
            let mut schema_txn = PgSchemaTransaction { txn: &txn };
            definition.up.apply(&mut schema_txn).await?;
            txn.execute(&insert, &[&definition.version, &definition.name, &checksum])
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok::<(), MigrationError>(())
        }
        .await;

        match result {
            Ok(()) => txn
                .commit()
                .await
                .map_err(|e| script_error(definition, e.to_string())),
            Err(e) => {
                let _ = txn.rollback().await;
                Err(script_error(definition, e.to_string()))
            }
        }
    }

    async fn revert(&self, definition: &MigrationDefinition) -> MigrateResult<()> {
        let down = definition
            .down
            .as_ref()
            .ok_or_else(|| MigrationError::Irreversible {
                version: definition.version,
                name: definition.name.clone(),
            })?;

        let mut client = self.client().await?;
        let txn = client
            .transaction()
            .await
            .map_err(|e| MigrationError::database(e.to_string()))?;

        let delete = format!("DELETE FROM {} WHERE version = $1", self.history_table);

        let result = async {
            let mut schema_txn = PgSchemaTransaction { txn: &txn };
            down.apply(&mut schema_txn).await?;
            txn.execute(&delete, &[&definition.version])
                .await
                .map_err(|e| MigrationError::database(e.to_string()))?;
            Ok::<(), MigrationError>(())
        }
        .await;

        match result {
            Ok(()) => txn
                .commit()
                .await
                .map_err(|e| script_error(definition, e.to_string())),
            Err(e) => {
                let _ = txn.rollback().await;
                Err(script_error(definition, e.to_string()))
            }
        }
    }
}

/// Next step of the lock acquisition loop.
#[derive(Debug, PartialEq, Eq)]
enum LockStep {
    /// A stale holder was cleared; contend again immediately.
    Retry,
    /// The lock is held; wait before the next attempt.
    Sleep(Duration),
    /// The caller's deadline has passed.
    TimedOut,
}

/// Decide how the acquisition loop proceeds after a failed insert.
///
/// The deadline wins over everything else: repeated stale holders must not
/// extend the wait past the caller-supplied timeout.
fn next_lock_step(
    cleared_stale: bool,
    elapsed: Duration,
    timeout: Duration,
    poll_interval: Duration,
) -> LockStep {
    if elapsed >= timeout {
        LockStep::TimedOut
    } else if cleared_stale {
        LockStep::Retry
    } else {
        LockStep::Sleep(poll_interval.min(timeout - elapsed))
    }
}

fn script_error(definition: &MigrationDefinition, message: impl Into<String>) -> MigrationError {
    MigrationError::ScriptExecution {
        version: definition.version,
        name: definition.name.clone(),
        applied_before: 0,
        message: message.into(),
    }
}

/// The transaction surface handed to change scripts.
struct PgSchemaTransaction<'a, 'b> {
    txn: &'a deadpool_postgres::Transaction<'b>,
}

#[async_trait::async_trait]
impl SchemaTransaction for PgSchemaTransaction<'_, '_> {
    async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()> {
        debug!(sql = %sql, "executing script batch");
        self.txn
            .batch_execute(sql)
            .await
            .map_err(|e| MigrationError::database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_for_sql() -> PgBackend {
        // Pool construction does not connect; safe without a server.
        let config = PgConfig::from_url("postgresql://localhost/app").unwrap();
        PgBackend {
            pool: build_pool(&config).unwrap(),
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            lock: LockSettings::default(),
        }
    }

    #[test]
    fn test_pool_builds_with_create_timeout() {
        // A timeout on the pool requires a named runtime; the builder must
        // succeed with the exact configuration connect() uses.
        let config =
            PgConfig::from_url("postgresql://localhost/app?connect_timeout=5").unwrap();
        assert!(build_pool(&config).is_ok());
    }

    #[test]
    fn test_lock_wait_is_bounded_despite_stale_clears() {
        let poll = Duration::from_millis(500);
        let timeout = Duration::from_secs(5);

        // Past the deadline the wait ends, even right after clearing a
        // stale holder.
        assert_eq!(
            next_lock_step(true, Duration::from_secs(6), timeout, poll),
            LockStep::TimedOut
        );
        assert_eq!(
            next_lock_step(false, timeout, timeout, poll),
            LockStep::TimedOut
        );

        // Within the deadline a cleared stale row means immediate recontention.
        assert_eq!(
            next_lock_step(true, Duration::from_secs(1), timeout, poll),
            LockStep::Retry
        );

        // Otherwise sleep, never past the deadline.
        assert_eq!(
            next_lock_step(false, Duration::from_secs(1), timeout, poll),
            LockStep::Sleep(poll)
        );
        assert_eq!(
            next_lock_step(false, Duration::from_millis(4800), timeout, poll),
            LockStep::Sleep(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_bootstrap_race_codes_are_tolerated() {
        assert!(is_bootstrap_race(Some(&SqlState::UNIQUE_VIOLATION)));
        assert!(is_bootstrap_race(Some(&SqlState::DUPLICATE_TABLE)));
        assert!(!is_bootstrap_race(Some(&SqlState::SYNTAX_ERROR)));
        assert!(!is_bootstrap_race(None));
    }

    #[test]
    fn test_history_init_sql() {
        let backend = backend_for_sql();
        let sql = backend.history_init_sql();
        assert!(sql.contains("_stratum_migrations"));
        assert!(sql.contains("version BIGINT PRIMARY KEY"));
        assert!(sql.contains("checksum VARCHAR(64)"));
        assert!(sql.contains("applied_at"));
    }

    #[test]
    fn test_lock_init_sql() {
        let backend = backend_for_sql();
        let sql = backend.lock_init_sql();
        assert!(sql.contains("_stratum_lock"));
        assert!(sql.contains("holder"));
        assert!(sql.contains("locked_at"));
    }

    #[test]
    fn test_table_names_are_configurable() {
        let backend = backend_for_sql()
            .with_history_table("app_schema_history")
            .with_lock_table("app_schema_lock");
        assert!(backend.history_init_sql().contains("app_schema_history"));
        assert!(backend.lock_init_sql().contains("app_schema_lock"));
        assert_eq!(backend.history_table(), "app_schema_history");
    }

    #[test]
    fn test_lock_settings_default_is_conservative() {
        let settings = LockSettings::default();
        assert_eq!(settings.stale_after, Duration::from_secs(30 * 60));
        assert!(settings.poll_interval < settings.stale_after);
    }
}
