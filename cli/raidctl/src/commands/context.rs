//! Context commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::config::{config_path, Config};
use crate::error::CliError;
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ContextCommand {
    #[command(subcommand)]
    command: ContextSubcommand,
}

#[derive(Debug, Subcommand)]
enum ContextSubcommand {
    /// Show current settings.
    Show,

    /// Set the backend base URL.
    SetApiUrl {
        /// Base URL, including the `/api` prefix.
        url: String,
    },

    /// Set the party row labels, in display order.
    SetParties {
        /// Labels, e.g. `1파티 2파티 3파티`.
        #[arg(required = true)]
        parties: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct ContextView<'a> {
    config_path: Option<String>,
    api_url: &'a str,
    parties: &'a [String],
}

impl ContextCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ContextSubcommand::Show => show(&ctx),
            ContextSubcommand::SetApiUrl { url } => set_api_url(url),
            ContextSubcommand::SetParties { parties } => set_parties(parties),
        }
    }
}

fn show(ctx: &CommandContext) -> Result<()> {
    let view = ContextView {
        config_path: config_path().ok().map(|p| p.display().to_string()),
        api_url: &ctx.config.api_url,
        parties: &ctx.config.parties,
    };

    match ctx.format {
        OutputFormat::Json => print_single(&view),
        OutputFormat::Table => {
            if let Some(path) = &view.config_path {
                println!("Config:  {path}");
            }
            println!("API URL: {}", view.api_url);
            println!("Parties: {}", view.parties.join(", "));
        }
    }
    Ok(())
}

fn set_api_url(url: String) -> Result<()> {
    let url = url.trim().trim_end_matches('/').to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CliError::InvalidArgument(format!("not an http(s) URL: {url}")).into());
    }

    // Start from the file, not the merged context, so --api-url is not persisted.
    let mut config = Config::load()?;
    config.api_url = url;
    config.save()?;
    print_success(&format!("API URL set to {}", config.api_url));
    Ok(())
}

fn set_parties(parties: Vec<String>) -> Result<()> {
    let parties = normalize_parties(parties)?;
    let mut config = Config::load()?;
    config.parties = parties;
    config.save()?;
    print_success(&format!("Parties set to {}", config.parties.join(", ")));
    Ok(())
}

fn normalize_parties(parties: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(parties.len());
    for party in parties {
        let party = party.trim().to_string();
        if party.is_empty() {
            return Err(CliError::InvalidArgument("party label cannot be empty".into()).into());
        }
        if out.contains(&party) {
            return Err(CliError::InvalidArgument(format!("duplicate party: {party}")).into());
        }
        out.push(party);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_parties() {
        let parties = normalize_parties(vec![" A ".into(), "B".into()]).unwrap();
        assert_eq!(parties, vec!["A", "B"]);
        assert!(normalize_parties(vec!["A".into(), "A".into()]).is_err());
        assert!(normalize_parties(vec!["  ".into()]).is_err());
    }
}
