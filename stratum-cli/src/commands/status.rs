//! `stratum status` - show applied and pending migrations.

use crate::cli::Cli;
use crate::error::CliResult;
use crate::output;

/// Run the status command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Migration Status");

    let migrator = super::build_migrator(cli).await?;
    let status = migrator.status().await?;

    for record in &status.applied {
        output::list_item(&output::style_applied(&format!(
            "{}_{} (applied {})",
            record.version,
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        )));
    }
    for (version, name) in &status.pending {
        output::list_item(&output::style_pending(&format!(
            "{}_{} (pending)",
            version, name
        )));
    }
    output::newline();

    for drift in &status.drift {
        output::warn(&drift.to_string());
    }

    output::kv("Applied", &status.applied.len().to_string());
    output::kv("Pending", &status.pending.len().to_string());

    Ok(())
}
