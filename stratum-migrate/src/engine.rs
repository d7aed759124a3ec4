//! The migrator - orchestration of locking, planning, execution, and
//! bookkeeping.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::executor::MigrationBackend;
use crate::history::{AppliedRecord, DriftWarning, current_version, detect_drift};
use crate::source::{MigrationDefinition, MigrationSource};

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply pending migrations.
    Up,
    /// Revert the most recently applied migration.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Phase of a run, reported in tracing events.
///
/// A run moves Idle → Locking → Planning → Executing → Recording →
/// Unlocking → Done; Failed is terminal and reachable from Locking,
/// Executing, and Recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Locking,
    Planning,
    Executing,
    Recording,
    Unlocking,
    Done,
    Failed,
}

/// Configuration for the migrator.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// How long to wait for the run lock.
    pub lock_timeout: Duration,
    /// Treat checksum drift as a hard failure instead of a warning.
    pub fail_on_drift: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            fail_on_drift: false,
        }
    }
}

impl MigratorConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set whether checksum drift fails the run.
    pub fn fail_on_drift(mut self, fail: bool) -> Self {
        self.fail_on_drift = fail;
        self
    }
}

/// Report of a completed run.
#[derive(Debug)]
pub struct MigrateReport {
    /// Direction of the run.
    pub direction: Direction,
    /// `(version, name)` of each migration applied or reverted, in run order.
    pub changed: Vec<(i64, String)>,
    /// Checksum drift observed against already-applied history.
    pub drift: Vec<DriftWarning>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl MigrateReport {
    /// Number of migrations applied or reverted.
    pub fn count(&self) -> usize {
        self.changed.len()
    }

    /// Whether the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let verb = match self.direction {
            Direction::Up => "applied",
            Direction::Down => "reverted",
        };
        if self.is_noop() {
            format!("nothing to {}", if self.direction == Direction::Up { "apply" } else { "revert" })
        } else {
            format!("{} {} in {}ms", self.count(), verb, self.duration_ms)
        }
    }
}

/// Applied and pending sets, computed without taking the run lock.
#[derive(Debug)]
pub struct MigrationStatus {
    /// Applied records, ascending by version.
    pub applied: Vec<AppliedRecord>,
    /// `(version, name)` of pending definitions, ascending by version.
    pub pending: Vec<(i64, String)>,
    /// Checksum drift observed against already-applied history.
    pub drift: Vec<DriftWarning>,
}

/// The orchestration state machine.
///
/// Current schema state is never cached: it is derived from the history
/// store's contents on each run.
pub struct Migrator<S, B> {
    source: S,
    backend: B,
    config: MigratorConfig,
}

impl<S: MigrationSource, B: MigrationBackend> Migrator<S, B> {
    /// Create a migrator with the default configuration.
    pub fn new(source: S, backend: B) -> Self {
        Self::with_config(source, backend, MigratorConfig::default())
    }

    /// Create a migrator with an explicit configuration.
    pub fn with_config(source: S, backend: B, config: MigratorConfig) -> Self {
        Self {
            source,
            backend,
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Apply all pending migrations in ascending version order.
    ///
    /// Each migration runs in its own transaction together with its history
    /// record. The run stops at the first failure; migrations committed
    /// earlier in the run remain applied and a rerun resumes from the failed
    /// version. With nothing pending this is a no-op success.
    pub async fn up(&self) -> MigrateResult<MigrateReport> {
        let start = Instant::now();

        // Source problems abort before any database interaction.
        let definitions = self.source.load().await?;

        debug!(phase = ?RunPhase::Locking, timeout_ms = self.config.lock_timeout.as_millis() as u64, "acquiring run lock");
        let token = self.backend.acquire(self.config.lock_timeout).await?;

        let outcome = self.run_up(&definitions, start).await;

        debug!(phase = ?RunPhase::Unlocking, "releasing run lock");
        let released = self.backend.release(token).await;

        let report = outcome?;
        released?;

        info!(phase = ?RunPhase::Done, applied = report.count(), duration_ms = report.duration_ms, "migration run complete");
        Ok(report)
    }

    async fn run_up(
        &self,
        definitions: &[MigrationDefinition],
        start: Instant,
    ) -> MigrateResult<MigrateReport> {
        self.backend.ensure_schema().await?;

        debug!(phase = ?RunPhase::Planning, "reading history");
        let applied = self.backend.list_applied().await?;
        let drift = self.check_drift(definitions, &applied)?;

        let plan = plan_up(definitions, &applied)?;
        debug!(pending = plan.len(), "computed run plan");

        let mut changed: Vec<(i64, String)> = Vec::new();
        for def in plan {
            info!(phase = ?RunPhase::Executing, version = def.version, name = %def.name, "applying migration");
            match self.backend.apply(def).await {
                Ok(()) => changed.push((def.version, def.name.clone())),
                Err(MigrationError::ScriptExecution {
                    version,
                    name,
                    message,
                    ..
                }) => {
                    warn!(phase = ?RunPhase::Failed, version, committed = changed.len(), "migration failed; stopping run");
                    return Err(MigrationError::ScriptExecution {
                        version,
                        name,
                        applied_before: changed.len(),
                        message,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        Ok(MigrateReport {
            direction: Direction::Up,
            changed,
            drift,
            duration_ms: start.elapsed().as_millis() as i64,
        })
    }

    /// Revert the single most recently applied migration.
    ///
    /// Single-step rollback is the granularity: reverting further means
    /// calling this again, which keeps each rollback auditable.
    pub async fn down(&self) -> MigrateResult<MigrateReport> {
        let start = Instant::now();

        let definitions = self.source.load().await?;

        debug!(phase = ?RunPhase::Locking, "acquiring run lock");
        let token = self.backend.acquire(self.config.lock_timeout).await?;

        let outcome = self.run_down(&definitions, start).await;

        debug!(phase = ?RunPhase::Unlocking, "releasing run lock");
        let released = self.backend.release(token).await;

        let report = outcome?;
        released?;

        info!(phase = ?RunPhase::Done, reverted = report.count(), "rollback complete");
        Ok(report)
    }

    async fn run_down(
        &self,
        definitions: &[MigrationDefinition],
        start: Instant,
    ) -> MigrateResult<MigrateReport> {
        self.backend.ensure_schema().await?;

        debug!(phase = ?RunPhase::Planning, "reading history");
        let applied = self.backend.list_applied().await?;
        let drift = self.check_drift(definitions, &applied)?;

        let last = applied
            .iter()
            .max_by_key(|r| r.version)
            .ok_or(MigrationError::NothingToRevert)?;

        let def = definitions
            .iter()
            .find(|d| d.version == last.version)
            .ok_or_else(|| {
                MigrationError::load(format!(
                    "no definition found for applied version {}",
                    last.version
                ))
            })?;

        if !def.is_reversible() {
            return Err(MigrationError::Irreversible {
                version: def.version,
                name: def.name.clone(),
            });
        }

        info!(phase = ?RunPhase::Executing, version = def.version, name = %def.name, "reverting migration");
        self.backend.revert(def).await?;

        Ok(MigrateReport {
            direction: Direction::Down,
            changed: vec![(def.version, def.name.clone())],
            drift,
            duration_ms: start.elapsed().as_millis() as i64,
        })
    }

    /// Applied and pending sets, without taking the lock or executing
    /// anything.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let definitions = self.source.load().await?;
        self.backend.ensure_schema().await?;
        let applied = self.backend.list_applied().await?;

        let drift = detect_drift(&definitions, &applied);
        let applied_versions: HashSet<i64> = applied.iter().map(|r| r.version).collect();
        let pending = definitions
            .iter()
            .filter(|d| !applied_versions.contains(&d.version))
            .map(|d| (d.version, d.name.clone()))
            .collect();

        Ok(MigrationStatus {
            applied,
            pending,
            drift,
        })
    }

    fn check_drift(
        &self,
        definitions: &[MigrationDefinition],
        applied: &[AppliedRecord],
    ) -> MigrateResult<Vec<DriftWarning>> {
        let drift = detect_drift(definitions, applied);

        if self.config.fail_on_drift {
            if let Some(d) = drift.first() {
                return Err(MigrationError::Drift {
                    version: d.version,
                    recorded: d.recorded.clone(),
                    actual: d.actual.clone(),
                });
            }
        }

        for d in &drift {
            warn!(version = d.version, "checksum drift detected");
        }

        Ok(drift)
    }
}

/// Pending definitions in ascending version order.
///
/// Applied records must form a contiguous prefix of the definition sequence:
/// a pending version below the current schema version is rejected rather
/// than applied out of order.
fn plan_up<'a>(
    definitions: &'a [MigrationDefinition],
    applied: &[AppliedRecord],
) -> MigrateResult<Vec<&'a MigrationDefinition>> {
    let applied_versions: HashSet<i64> = applied.iter().map(|r| r.version).collect();
    let pending: Vec<&MigrationDefinition> = definitions
        .iter()
        .filter(|d| !applied_versions.contains(&d.version))
        .collect();

    if let Some(current) = current_version(applied) {
        if let Some(stale) = pending.iter().find(|d| d.version < current) {
            return Err(MigrationError::OutOfOrder {
                version: stale.version,
                current,
            });
        }
    }

    Ok(pending)
}
