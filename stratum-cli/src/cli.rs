//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stratum CLI - versioned schema migrations
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(version)]
#[command(about = "Stratum - versioned schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Directory containing migrations
    #[arg(long, default_value = "./migrations", global = true)]
    pub migrations: PathBuf,

    /// Seconds to wait for the migration lock
    #[arg(long, default_value_t = 30, global = true)]
    pub lock_timeout: u64,

    /// Fail when an applied migration's script changed on disk
    #[arg(long, global = true)]
    pub fail_on_drift: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply all pending migrations
    Up,

    /// Revert the most recently applied migration
    Down,

    /// Show applied and pending migrations
    Status,

    /// Scaffold a new migration
    New(NewArgs),
}

/// Arguments for the `new` command
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Migration name (snake_case)
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up() {
        let cli = Cli::try_parse_from(["stratum", "up"]).unwrap();
        assert!(matches!(cli.command, Command::Up));
        assert_eq!(cli.migrations, PathBuf::from("./migrations"));
        assert_eq!(cli.lock_timeout, 30);
        assert!(!cli.fail_on_drift);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stratum",
            "up",
            "--database-url",
            "postgresql://localhost/app",
            "--lock-timeout",
            "5",
            "--fail-on-drift",
        ])
        .unwrap();
        assert_eq!(
            cli.database_url.as_deref(),
            Some("postgresql://localhost/app")
        );
        assert_eq!(cli.lock_timeout, 5);
        assert!(cli.fail_on_drift);
    }

    #[test]
    fn test_parse_new_requires_name() {
        assert!(Cli::try_parse_from(["stratum", "new"]).is_err());

        let cli = Cli::try_parse_from(["stratum", "new", "create_users"]).unwrap();
        match cli.command {
            Command::New(args) => assert_eq!(args.name, "create_users"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["stratum", "sideways"]).is_err());
    }
}
