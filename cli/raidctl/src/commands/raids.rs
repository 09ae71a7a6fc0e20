//! Raid column commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::{applied, index_arg, CommandContext};

#[derive(Debug, Args)]
pub struct RaidsCommand {
    #[command(subcommand)]
    command: RaidsSubcommand,
}

#[derive(Debug, Subcommand)]
enum RaidsSubcommand {
    /// List raids in column order.
    List,

    /// Append a raid column.
    Add {
        /// Raid name.
        name: String,
    },

    /// Delete a raid column and every cell under it.
    Delete {
        /// Raid name.
        name: String,
    },

    /// Move a raid column (positions are 1-based).
    Move {
        /// Current position.
        from: usize,

        /// New position.
        to: usize,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct RaidRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SEQ")]
    seq: i32,
    #[tabled(rename = "ASSIGNED")]
    assigned: usize,
}

impl RaidsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            RaidsSubcommand::List => list(ctx).await,
            RaidsSubcommand::Add { name } => add(ctx, name).await,
            RaidsSubcommand::Delete { name } => delete(ctx, name).await,
            RaidsSubcommand::Move { from, to } => move_raid(ctx, from, to).await,
        }
    }
}

async fn list(ctx: CommandContext) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;

    let rows: Vec<RaidRow> = grid
        .raids()
        .iter()
        .enumerate()
        .map(|(i, raid)| RaidRow {
            position: i + 1,
            name: raid.name.clone(),
            seq: raid.seq,
            assigned: grid
                .cells()
                .iter()
                .filter(|(key, _)| key.raid == raid.name)
                .map(|(_, occupants)| occupants.len())
                .sum(),
        })
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}

async fn add(ctx: CommandContext, name: String) -> Result<()> {
    let session = ctx.session().await?;
    session.add_raid(&name).await?;
    ctx.save(&session, &format!("Raid '{}' added", name.trim()))
        .await?;
    Ok(())
}

async fn delete(ctx: CommandContext, name: String) -> Result<()> {
    let session = ctx.session().await?;
    session.delete_raid(&name).await?;
    ctx.save(&session, &format!("Raid '{name}' deleted")).await?;
    Ok(())
}

async fn move_raid(ctx: CommandContext, from: usize, to: usize) -> Result<()> {
    let session = ctx.session().await?;
    let len = session.grid().await.raids().len();
    let source = index_arg(from, "raids", len)?;
    let target = index_arg(to, "raids", len)?;

    session.begin_raid_drag(source).await?;
    applied(
        session.drop_on_raid_header(target).await,
        "raid is already at that position",
    )?;

    ctx.save(&session, &format!("Raid moved from {from} to {to}"))
        .await?;
    Ok(())
}
