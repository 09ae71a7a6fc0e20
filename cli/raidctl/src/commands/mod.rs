//! CLI commands.

mod characters;
mod context;
mod grid;
mod raids;
mod users;
mod watch;
mod week;

use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use raidboard_client::{ApiClient, Backend, SaveAllReport, Session};
use raidboard_grid::{BoardChange, DropResult, GridError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, print_warning, OutputFormat};

/// raidboard CLI - edit the raid schedule board from a terminal.
#[derive(Debug, Parser)]
#[command(name = "raidctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Backend base URL (overrides the config file).
    #[arg(long, global = true, env = "RAIDBOARD_API_URL")]
    api_url: Option<String>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show or change saved CLI settings.
    Context(context::ContextCommand),

    /// Show the board and edit its cells.
    Grid(grid::GridCommand),

    /// Manage raid columns.
    Raids(raids::RaidsCommand),

    /// Manage characters.
    Characters(characters::CharactersCommand),

    /// List users.
    Users(users::UsersCommand),

    /// Show and edit user availability for the two tracked weeks.
    Week(week::WeekCommand),

    /// Follow live updates and print the board when it changes.
    Watch(watch::WatchCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Compact human logs on stderr. `RUST_LOG` wins over `-v`.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        tracing_subscriber::fmt()
            .compact()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
            .init();
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }

        let ctx = CommandContext {
            config,
            format: self.format,
        };

        match self.command {
            Commands::Context(cmd) => cmd.run(ctx).await,
            Commands::Grid(cmd) => cmd.run(ctx).await,
            Commands::Raids(cmd) => cmd.run(ctx).await,
            Commands::Characters(cmd) => cmd.run(ctx).await,
            Commands::Users(cmd) => cmd.run(ctx).await,
            Commands::Week(cmd) => cmd.run(ctx).await,
            Commands::Watch(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("raidctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(ApiClient::new(&self.config.api_url)?))
    }

    /// Load the board. Collections the backend could not serve use defaults.
    pub async fn session(&self) -> Result<Session> {
        debug!(api_url = %self.config.api_url, "loading board");
        let session = Session::open(self.backend()?, self.config.parties.clone()).await;
        if !session.load_fallbacks().is_empty() {
            let names: Vec<&str> = session.load_fallbacks().iter().map(|c| c.as_str()).collect();
            print_warning(&format!(
                "could not load {}; showing built-in defaults",
                names.join(", ")
            ));
        }
        Ok(session)
    }

    /// Saves the session's tracked changes and reports the result.
    pub async fn save(&self, session: &Session, message: &str) -> Result<SaveAllReport> {
        let report = session.save_all().await?;
        match self.format {
            OutputFormat::Table if report.is_empty() => print_info("Nothing to save."),
            OutputFormat::Table => print_success(message),
            OutputFormat::Json => {
                let saved: Vec<&str> = report.saved.iter().map(|s| s.as_str()).collect();
                print_single(&serde_json::json!({ "saved": saved }));
            }
        }
        Ok(report)
    }
}

/// Turns a drop outcome into a change, or a user-facing error.
pub fn applied(result: DropResult, what: &str) -> Result<BoardChange> {
    match result {
        DropResult::Applied(change) => Ok(change),
        DropResult::Rejected(violation) => Err(CliError::Rejected(violation).into()),
        DropResult::Ignored => Err(CliError::NoChange(what.to_string()).into()),
    }
}

/// Converts a 1-based position argument to an index.
pub fn index_arg(position: usize, list: &'static str, len: usize) -> Result<usize> {
    if position == 0 || position > len {
        return Err(GridError::IndexOutOfRange {
            list,
            index: position,
            len,
        }
        .into());
    }
    Ok(position - 1)
}

#[cfg(test)]
mod tests {
    use raidboard_grid::Violation;

    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "raidctl", "-vv", "grid", "show", "--format", "json", "--api-url", "http://x/api",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.api_url.as_deref(), Some("http://x/api"));
    }

    #[test]
    fn test_applied_maps_outcomes() {
        let err = applied(DropResult::Rejected(Violation::CellFinished), "place").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Rejected(Violation::CellFinished))
        ));
        let err = applied(DropResult::Ignored, "move").unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::NoChange(_))));
    }

    #[test]
    fn test_index_arg_is_one_based() {
        assert_eq!(index_arg(1, "raids", 3).unwrap(), 0);
        assert_eq!(index_arg(3, "raids", 3).unwrap(), 2);
        assert!(index_arg(0, "raids", 3).is_err());
        assert!(index_arg(4, "raids", 3).is_err());
    }
}
