//! CLI argument parsing for the callcenter-worker binary.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "callcenter-worker", about = "Call center admin backend worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Which table an import or bulk delete targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataKind {
    Agents,
    Stats,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Create or update an admin user interactively
    CreateAdmin {
        /// Admin email address
        #[arg(long)]
        email: String,
    },
    /// Import a .csv, .xlsx or .xls file
    Import {
        #[arg(value_enum)]
        kind: DataKind,
        file: PathBuf,
        /// Reconcile against a snapshot of the database without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Export call statistics to an .xlsx file
    Export {
        /// Target directory (defaults to EXPORT_DIR)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        team: Option<String>,
        /// Substring of the agent's first or last name
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        service: Option<String>,
        /// Inclusive, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Inclusive, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Comma-separated column names, all columns when omitted
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Delete every row of one table
    DeleteAll {
        #[arg(value_enum)]
        kind: DataKind,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_migrate_command_parses() {
        let cli = Cli::parse_from(["callcenter-worker", "migrate"]);
        assert!(matches!(cli.command, Some(Command::Migrate)));
    }

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["callcenter-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_import_parses_kind_and_dry_run() {
        let cli = Cli::parse_from(["callcenter-worker", "import", "agents", "roster.xlsx", "--dry-run"]);
        match cli.command {
            Some(Command::Import { kind, file, dry_run }) => {
                assert_eq!(kind, DataKind::Agents);
                assert_eq!(file, PathBuf::from("roster.xlsx"));
                assert!(dry_run);
            }
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_cli_export_parses_filters_and_columns() {
        let cli = Cli::parse_from([
            "callcenter-worker",
            "export",
            "--from",
            "2024-05-01",
            "--columns",
            "team_name,DateColumn",
        ]);
        match cli.command {
            Some(Command::Export { from, columns, out_dir, .. }) => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 5, 1));
                assert_eq!(columns, vec!["team_name", "DateColumn"]);
                assert!(out_dir.is_none());
            }
            _ => panic!("expected export command"),
        }
    }

    #[test]
    fn test_cli_delete_all_requires_known_kind() {
        assert!(Cli::try_parse_from(["callcenter-worker", "delete-all", "customers"]).is_err());
        let cli = Cli::parse_from(["callcenter-worker", "delete-all", "stats", "--yes"]);
        assert!(matches!(
            cli.command,
            Some(Command::DeleteAll { kind: DataKind::Stats, yes: true })
        ));
    }
}
