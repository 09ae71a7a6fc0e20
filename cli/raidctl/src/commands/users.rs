//! User commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Debug, Subcommand)]
enum UsersSubcommand {
    /// List users with their colour and character count.
    List,
}

#[derive(Debug, Serialize, Tabled)]
struct UserRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "COLOR")]
    color: String,
    #[tabled(rename = "CHARACTERS")]
    characters: usize,
}

impl UsersCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            UsersSubcommand::List => list(ctx).await,
        }
    }
}

async fn list(ctx: CommandContext) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;

    let rows: Vec<UserRow> = grid
        .users()
        .iter()
        .map(|user| UserRow {
            name: user.name.clone(),
            color: user.color.clone(),
            characters: grid.user_characters(&user.name).len(),
        })
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}
