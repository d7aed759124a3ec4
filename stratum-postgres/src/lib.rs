//! # stratum-postgres
//!
//! PostgreSQL backend for the Stratum migration engine.
//!
//! Provides [`PgBackend`], which implements the engine's
//! [`MigrationBackend`](stratum_migrate::MigrationBackend) seam:
//!
//! - history tracking in a `_stratum_migrations` table
//! - a single-row lock table serializing runs across processes, with
//!   conservative stale-lock clearing
//! - per-migration transactions that commit script execution and history
//!   bookkeeping together
//!
//! ## Example
//!
//! ```rust,ignore
//! use stratum_migrate::{DirectorySource, Migrator};
//! use stratum_postgres::{PgBackend, PgConfig};
//!
//! async fn deploy() -> stratum_migrate::MigrateResult<()> {
//!     let config = PgConfig::from_url("postgresql://localhost/app")?;
//!     let backend = PgBackend::connect(&config).await?;
//!     let migrator = Migrator::new(DirectorySource::new("./migrations"), backend);
//!
//!     let report = migrator.up().await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;

// Re-exports
pub use backend::{DEFAULT_HISTORY_TABLE, DEFAULT_LOCK_TABLE, LockSettings, PgBackend};
pub use config::PgConfig;
