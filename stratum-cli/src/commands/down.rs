//! `stratum down` - revert the most recently applied migration.

use crate::cli::Cli;
use crate::error::CliResult;
use crate::output;

/// Run the down command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Migrate Down");
    output::kv("Migrations", &cli.migrations.display().to_string());
    output::newline();

    let migrator = super::build_migrator(cli).await?;
    let report = migrator.down().await?;

    for drift in &report.drift {
        output::warn(&drift.to_string());
    }

    for (version, name) in &report.changed {
        output::list_item(&format!("{}_{}", version, name));
    }
    output::newline();
    output::success(&report.summary());

    Ok(())
}
