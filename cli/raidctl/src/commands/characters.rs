//! Character commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use raidboard_grid::GridState;
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::print_output;

use super::{applied, index_arg, CommandContext};

#[derive(Debug, Args)]
pub struct CharactersCommand {
    #[command(subcommand)]
    command: CharactersSubcommand,
}

#[derive(Debug, Subcommand)]
enum CharactersSubcommand {
    /// List characters, grouped by user in priority order.
    List {
        /// Only this user's characters.
        #[arg(long)]
        user: Option<String>,
    },

    /// Add a character to a user.
    Add(CharacterArgs),

    /// Delete a character. Its cell placements are kept.
    Delete(CharacterArgs),

    /// Toggle the supporter flag.
    Supporter(CharacterArgs),

    /// Move a character within its user's list (positions are 1-based).
    Move {
        /// Owning user.
        user: String,

        /// Current position.
        from: usize,

        /// New position.
        to: usize,
    },
}

#[derive(Debug, Args)]
struct CharacterArgs {
    /// Owning user.
    user: String,

    /// Character name.
    name: String,
}

#[derive(Debug, Serialize, Tabled)]
struct CharacterRow {
    #[tabled(rename = "USER")]
    user: String,
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SUPPORTER")]
    supporter: bool,
    #[tabled(rename = "RAIDS")]
    raids: String,
}

impl CharactersCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            CharactersSubcommand::List { user } => list(ctx, user).await,
            CharactersSubcommand::Add(args) => add(ctx, args).await,
            CharactersSubcommand::Delete(args) => delete(ctx, args).await,
            CharactersSubcommand::Supporter(args) => supporter(ctx, args).await,
            CharactersSubcommand::Move { user, from, to } => {
                move_character(ctx, user, from, to).await
            }
        }
    }
}

fn rows(grid: &GridState, user: Option<&str>) -> Vec<CharacterRow> {
    grid.characters()
        .iter()
        .filter(|(owner, _)| user.map_or(true, |u| u == owner.as_str()))
        .flat_map(|(owner, list)| {
            list.iter().enumerate().map(move |(i, character)| CharacterRow {
                user: owner.clone(),
                position: i + 1,
                name: character.name.clone(),
                supporter: character.is_supporter,
                raids: grid
                    .character_raids(&character.name)
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        })
        .collect()
}

async fn list(ctx: CommandContext, user: Option<String>) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;

    if let Some(user) = &user {
        if !grid.has_user(user) {
            return Err(CliError::InvalidArgument(format!("unknown user: {user}")).into());
        }
    }

    print_output(&rows(&grid, user.as_deref()), ctx.format);
    Ok(())
}

async fn add(ctx: CommandContext, args: CharacterArgs) -> Result<()> {
    let session = ctx.session().await?;
    session.add_character(&args.user, &args.name).await?;
    ctx.save(
        &session,
        &format!("Character '{}' added to {}", args.name.trim(), args.user),
    )
    .await?;
    Ok(())
}

async fn delete(ctx: CommandContext, args: CharacterArgs) -> Result<()> {
    let session = ctx.session().await?;
    session.delete_character(&args.user, &args.name).await?;
    ctx.save(
        &session,
        &format!("Character '{}' deleted from {}", args.name, args.user),
    )
    .await?;
    Ok(())
}

async fn supporter(ctx: CommandContext, args: CharacterArgs) -> Result<()> {
    let session = ctx.session().await?;
    session.toggle_supporter(&args.user, &args.name).await?;
    let is_supporter = session
        .grid()
        .await
        .find_character(&args.user, &args.name)
        .is_some_and(|c| c.is_supporter);

    let role = if is_supporter { "a supporter" } else { "a dealer" };
    ctx.save(&session, &format!("'{}' is now {role}", args.name))
        .await?;
    Ok(())
}

async fn move_character(ctx: CommandContext, user: String, from: usize, to: usize) -> Result<()> {
    let session = ctx.session().await?;
    let len = session.grid().await.user_characters(&user).len();
    let source = index_arg(from, "characters", len)?;
    let target = index_arg(to, "characters", len)?;

    session.begin_character_order_drag(&user, source).await?;
    applied(
        session.drop_on_character_order(&user, target).await,
        "character is already at that position",
    )?;

    ctx.save(&session, &format!("Moved {user}'s character from {from} to {to}"))
        .await?;
    Ok(())
}
