//! `stratum new` - scaffold a new migration directory.

use stratum_migrate::DirectorySource;

use crate::cli::{Cli, NewArgs};
use crate::error::CliResult;
use crate::output;

/// Run the new command
pub async fn run(cli: &Cli, args: &NewArgs) -> CliResult<()> {
    let source = DirectorySource::new(&cli.migrations);
    let path = source.generate(&args.name).await?;

    output::success(&format!("Created {}", path.display()));
    output::list_item("Edit up.sql with the change");
    output::list_item("Edit down.sql with the revert (or delete it to mark irreversible)");

    Ok(())
}
