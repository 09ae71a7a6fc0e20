//! Grid commands: show the board, place and remove characters, toggle
//! finished cells.

use anyhow::Result;
use clap::{Args, Subcommand};
use raidboard_grid::{CellKey, GridState};

use crate::error::CliError;
use crate::output::{print_single, render_grid, GridView, OutputFormat};

use super::{applied, CommandContext};

#[derive(Debug, Args)]
pub struct GridCommand {
    #[command(subcommand)]
    command: GridSubcommand,
}

#[derive(Debug, Subcommand)]
enum GridSubcommand {
    /// Print the party x raid board.
    Show,

    /// Place a character into a cell.
    Place(PlaceArgs),

    /// Remove a character from a cell.
    Unassign(UnassignArgs),

    /// Toggle a cell's finished flag.
    Finish(CellArgs),
}

#[derive(Debug, Args)]
struct CellArgs {
    /// Party label (row).
    party: String,

    /// Raid name (column).
    raid: String,
}

#[derive(Debug, Args)]
struct PlaceArgs {
    #[command(flatten)]
    cell: CellArgs,

    /// Character name.
    character: String,

    /// Owning user; needed only when two users share a character name.
    #[arg(long)]
    user: Option<String>,
}

#[derive(Debug, Args)]
struct UnassignArgs {
    #[command(flatten)]
    cell: CellArgs,

    /// Character name.
    character: String,
}

impl GridCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            GridSubcommand::Show => show(ctx).await,
            GridSubcommand::Place(args) => place(ctx, args).await,
            GridSubcommand::Unassign(args) => unassign(ctx, args).await,
            GridSubcommand::Finish(args) => finish(ctx, args).await,
        }
    }
}

impl CellArgs {
    fn key(&self, grid: &GridState) -> Result<CellKey> {
        let key = CellKey::new(self.party.trim(), self.raid.trim());
        if !grid.is_known_cell(&key) {
            return Err(CliError::InvalidArgument(format!(
                "no cell for party '{}' and raid '{}'",
                key.party, key.raid
            ))
            .into());
        }
        Ok(key)
    }
}

/// Finds the owner of `character`, using `user` when given.
fn owner(grid: &GridState, character: &str, user: Option<&str>) -> Result<String> {
    if let Some(user) = user {
        return Ok(user.to_string());
    }
    let owners: Vec<&String> = grid
        .characters()
        .iter()
        .filter(|(_, list)| list.iter().any(|c| c.name == character))
        .map(|(user, _)| user)
        .collect();
    match owners.as_slice() {
        [one] => Ok((*one).clone()),
        [] => Err(CliError::InvalidArgument(format!("no character named '{character}'")).into()),
        _ => Err(CliError::InvalidArgument(format!(
            "'{character}' belongs to several users; pass --user"
        ))
        .into()),
    }
}

async fn show(ctx: CommandContext) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;
    match ctx.format {
        OutputFormat::Table => println!("{}", render_grid(&grid)),
        OutputFormat::Json => print_single(&GridView::new(&grid)),
    }
    Ok(())
}

async fn place(ctx: CommandContext, args: PlaceArgs) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;
    let key = args.cell.key(&grid)?;
    let user = owner(&grid, &args.character, args.user.as_deref())?;

    let result = session.place(&user, &args.character, &key).await?;
    applied(result, "the character could not be placed")?;

    ctx.save(
        &session,
        &format!("Placed {} in {} / {}", args.character, key.party, key.raid),
    )
    .await?;
    Ok(())
}

async fn unassign(ctx: CommandContext, args: UnassignArgs) -> Result<()> {
    let session = ctx.session().await?;
    let key = args.cell.key(&session.grid().await)?;

    session
        .unassign(&key, &args.character)
        .await
        .ok_or_else(|| {
            CliError::NoChange(format!(
                "{} is not in {} / {}",
                args.character, key.party, key.raid
            ))
        })?;

    ctx.save(
        &session,
        &format!("Removed {} from {} / {}", args.character, key.party, key.raid),
    )
    .await?;
    Ok(())
}

async fn finish(ctx: CommandContext, args: CellArgs) -> Result<()> {
    let session = ctx.session().await?;
    let key = args.key(&session.grid().await)?;

    session
        .secondary_activate(&key, None)
        .await
        .ok_or_else(|| CliError::NoChange("finish flag unchanged".to_string()))?;
    let finished = session.grid().await.is_finished(&key);

    let state = if finished { "finished" } else { "open" };
    ctx.save(&session, &format!("{} / {} is now {state}", key.party, key.raid))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use raidboard_grid::defaults::default_grid;

    use super::*;

    #[test]
    fn test_owner_lookup() {
        let grid = default_grid();
        assert_eq!(owner(&grid, "마리", None).unwrap(), "샷건");
        assert_eq!(owner(&grid, "마리", Some("도당")).unwrap(), "도당");
        assert!(owner(&grid, "없음", None).is_err());
    }

    #[test]
    fn test_unknown_cell_rejected() {
        let grid = default_grid();
        let args = CellArgs {
            party: "9파티".into(),
            raid: "노브".into(),
        };
        assert!(args.key(&grid).is_err());
        let args = CellArgs {
            party: " 1파티".into(),
            raid: "노브".into(),
        };
        assert_eq!(args.key(&grid).unwrap(), CellKey::new("1파티", "노브"));
    }
}
