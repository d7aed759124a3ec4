//! Command implementations.

pub mod down;
pub mod new;
pub mod status;
pub mod up;

use std::time::Duration;

use stratum_migrate::{DirectorySource, Migrator, MigratorConfig};
use stratum_postgres::{PgBackend, PgConfig};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

/// Build a migrator from the global CLI arguments.
pub(crate) async fn build_migrator(cli: &Cli) -> CliResult<Migrator<DirectorySource, PgBackend>> {
    let url = cli.database_url.as_deref().ok_or_else(|| {
        CliError::config("no database URL; pass --database-url or set DATABASE_URL")
    })?;

    let pg_config = PgConfig::from_url(url)?.application_name("stratum");
    let backend = PgBackend::connect(&pg_config).await?;

    let source = DirectorySource::new(&cli.migrations);
    let config = MigratorConfig::new()
        .lock_timeout(Duration::from_secs(cli.lock_timeout))
        .fail_on_drift(cli.fail_on_drift);

    Ok(Migrator::with_config(source, backend, config))
}
