//! `stratum up` - apply all pending migrations.

use crate::cli::Cli;
use crate::error::CliResult;
use crate::output;

/// Run the up command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Migrate Up");
    output::kv("Migrations", &cli.migrations.display().to_string());
    output::newline();

    let migrator = super::build_migrator(cli).await?;
    let report = migrator.up().await?;

    for drift in &report.drift {
        output::warn(&drift.to_string());
    }

    if report.is_noop() {
        output::success("Nothing to apply; schema is up to date.");
    } else {
        for (version, name) in &report.changed {
            output::list_item(&format!("{}_{}", version, name));
        }
        output::newline();
        output::success(&report.summary());
    }

    Ok(())
}
