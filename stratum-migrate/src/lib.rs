//! # stratum-migrate
//!
//! Schema migration engine: applies and reverts ordered, versioned schema
//! changes against a relational database in a safe, repeatable, and
//! auditable way.
//!
//! This crate provides:
//! - Migration sources (filesystem directories, in-memory sets) with
//!   load-time validation of version ordering
//! - Durable history tracking in the target database
//! - A cross-process run lock so concurrent deployments cannot interleave DDL
//! - Transactional application and single-step rollback, one transaction per
//!   migration, with script and bookkeeping committed together
//! - Checksum drift detection against already-applied history
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐
//! │ Migration Source │────▶│   Migrator    │◀──── direction (up/down)
//! └──────────────────┘     └───────┬───────┘
//!                                  │ lock, plan, execute
//!                                  ▼
//!                          ┌───────────────┐     ┌───────────────┐
//!                          │ Lock Manager  │     │ History Store │
//!                          └───────────────┘     └───────────────┘
//!                                  │                     │
//!                                  └────────┬────────────┘
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │   Database    │
//!                                   └───────────────┘
//! ```
//!
//! The migrator derives the current schema version from the history store on
//! every run, computes the pending (or revertible) set, and executes each
//! migration's script inside its own transaction together with its history
//! record. A failure rolls back only the in-flight migration and stops the
//! run; a rerun resumes from the failed version.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stratum_migrate::{DirectorySource, Migrator, MigratorConfig};
//!
//! async fn deploy(backend: impl stratum_migrate::MigrationBackend) -> Result<(), Box<dyn std::error::Error>> {
//!     let source = DirectorySource::new("./migrations");
//!     let migrator = Migrator::new(source, backend);
//!
//!     let report = migrator.up().await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration layout
//!
//! Filesystem migrations are directories named `<VERSION>_<name>` holding an
//! `up.sql` and an optional `down.sql`; a migration without `down.sql` is
//! irreversible and cannot be targeted by a rollback:
//!
//! ```text
//! migrations/
//! ├── 20240101120000_create_users/
//! │   ├── up.sql
//! │   └── down.sql
//! └── 20240102090000_add_email/
//!     ├── up.sql
//!     └── down.sql
//! ```

pub mod change;
pub mod engine;
pub mod error;
pub mod executor;
pub mod history;
pub mod lock;
pub mod source;

// Re-exports
pub use change::{ChangeScript, ProceduralChange, SchemaTransaction};
pub use engine::{
    Direction, MigrateReport, MigrationStatus, Migrator, MigratorConfig, RunPhase,
};
pub use error::{MigrateResult, MigrationError};
pub use executor::{ChangeExecutor, MigrationBackend};
pub use history::{AppliedRecord, DriftWarning, HistoryStore, current_version, detect_drift};
pub use lock::{LockManager, LockToken};
pub use source::{DirectorySource, MigrationDefinition, MigrationSource, StaticSource, validate};
