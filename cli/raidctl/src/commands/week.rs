//! User availability commands for the two tracked weeks.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use raidboard_grid::{day_key, GridState, UserScheduleKey, WeekInfo, WeekNumber, DAYS};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::error::CliError;
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct WeekCommand {
    #[command(subcommand)]
    command: WeekSubcommand,
}

#[derive(Debug, Subcommand)]
enum WeekSubcommand {
    /// Show availability, one table per week.
    Show {
        /// Only this week (1 or 2).
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        week: Option<u8>,
    },

    /// Set the free text of one day.
    Set {
        #[command(flatten)]
        entry: EntryArgs,

        /// Free text, e.g. `21시~`.
        text: String,
    },

    /// Toggle whether one day is enabled.
    Toggle {
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Shift week 2 into week 1 and start an empty week 2.
    Advance,
}

#[derive(Debug, Args)]
struct EntryArgs {
    /// User name.
    user: String,

    /// Week (1 or 2).
    #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
    week: u8,

    /// Day name, e.g. `wed` or `Saturday`.
    day: String,
}

#[derive(Debug, Serialize)]
struct EntryView {
    user: String,
    day: &'static str,
    text: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct WeekView {
    week: u8,
    range: String,
    entries: Vec<EntryView>,
}

impl WeekCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            WeekSubcommand::Show { week } => show(ctx, week).await,
            WeekSubcommand::Set { entry, text } => set(ctx, entry, text).await,
            WeekSubcommand::Toggle { entry } => toggle(ctx, entry).await,
            WeekSubcommand::Advance => advance(ctx).await,
        }
    }
}

impl EntryArgs {
    fn key(&self, grid: &GridState) -> Result<UserScheduleKey> {
        if !grid.users().iter().any(|u| u.name == self.user) {
            return Err(CliError::InvalidArgument(format!("unknown user: {}", self.user)).into());
        }
        let day = day_key(&self.day)
            .ok_or_else(|| CliError::InvalidArgument(format!("unknown day: {}", self.day)))?;
        let week = WeekNumber::try_from(self.week).map_err(CliError::InvalidArgument)?;
        Ok(UserScheduleKey::new(self.user.clone(), week, day))
    }
}

fn weeks(only: Option<u8>) -> Vec<WeekNumber> {
    match only {
        Some(1) => vec![WeekNumber::First],
        Some(_) => vec![WeekNumber::Second],
        None => vec![WeekNumber::First, WeekNumber::Second],
    }
}

fn week_view(grid: &GridState, info: &WeekInfo, week: WeekNumber) -> WeekView {
    let mut entries = Vec::new();
    for user in grid.users() {
        for day in DAYS {
            let key = UserScheduleKey::new(user.name.clone(), week, day);
            if let Some(entry) = grid.user_schedule(&key) {
                entries.push(EntryView {
                    user: user.name.clone(),
                    day,
                    text: entry.text.clone(),
                    enabled: entry.is_enabled,
                });
            }
        }
    }
    WeekView {
        week: week.number(),
        range: info.range(week).to_string(),
        entries,
    }
}

fn render_week(grid: &GridState, week: WeekNumber) -> String {
    let mut builder = Builder::default();

    let mut header = vec![String::new()];
    header.extend(DAYS.iter().map(|day| day[..3].to_string()));
    builder.push_record(header);

    for user in grid.users() {
        let mut row = vec![user.name.clone()];
        for day in DAYS {
            let key = UserScheduleKey::new(user.name.clone(), week, day);
            let cell = match grid.user_schedule(&key) {
                Some(entry) if entry.is_enabled => entry.text.clone(),
                Some(entry) => format!("({}) off", entry.text),
                None => String::new(),
            };
            row.push(cell);
        }
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.to_string()
}

async fn show(ctx: CommandContext, only: Option<u8>) -> Result<()> {
    let session = ctx.session().await?;
    let grid = session.grid().await;
    let info = WeekInfo::current();

    match ctx.format {
        OutputFormat::Json => {
            let views: Vec<WeekView> = weeks(only)
                .into_iter()
                .map(|week| week_view(&grid, &info, week))
                .collect();
            print_single(&views);
        }
        OutputFormat::Table => {
            for week in weeks(only) {
                println!(
                    "{}",
                    format!("Week {} ({})", week.number(), info.range(week)).bold()
                );
                println!("{}", render_week(&grid, week));
            }
        }
    }
    Ok(())
}

async fn set(ctx: CommandContext, entry: EntryArgs, text: String) -> Result<()> {
    let session = ctx.session().await?;
    let key = entry.key(&session.grid().await)?;
    session.set_user_schedule_text(&key, &text).await?;
    ctx.save(&session, &format!("Updated {key}")).await?;
    Ok(())
}

async fn toggle(ctx: CommandContext, entry: EntryArgs) -> Result<()> {
    let session = ctx.session().await?;
    let key = entry.key(&session.grid().await)?;
    session.toggle_user_schedule_enabled(&key).await?;
    let enabled = session
        .grid()
        .await
        .user_schedule(&key)
        .map_or(true, |e| e.is_enabled);

    let state = if enabled { "enabled" } else { "disabled" };
    ctx.save(&session, &format!("{key} {state}")).await?;
    Ok(())
}

async fn advance(ctx: CommandContext) -> Result<()> {
    let session = ctx.session().await?;
    session.advance_week().await?;
    let info = WeekInfo::current();
    print_success(&format!(
        "Week advanced; week 1 is now {}",
        info.range(WeekNumber::First)
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use raidboard_grid::defaults::default_grid;
    use raidboard_grid::Board;
    use rstest::rstest;

    use super::*;

    fn entry(user: &str, week: u8, day: &str) -> EntryArgs {
        EntryArgs {
            user: user.into(),
            week,
            day: day.into(),
        }
    }

    #[test]
    fn test_entry_key_normalizes_day() {
        let grid = default_grid();
        let key = entry("도당", 2, "sat").key(&grid).unwrap();
        assert_eq!(key, UserScheduleKey::new("도당", WeekNumber::Second, "SATURDAY"));

        assert!(entry("도당", 1, "someday").key(&grid).is_err());
        assert!(entry("nobody", 1, "sat").key(&grid).is_err());
    }

    #[rstest]
    #[case::short("wed", "WEDNESDAY")]
    #[case::full("Sunday", "SUNDAY")]
    #[case::mixed("tUe", "TUESDAY")]
    fn test_entry_key_day_names(#[case] day: &str, #[case] expected: &str) {
        let key = entry("혀니", 1, day).key(&default_grid()).unwrap();
        assert_eq!(key.day, expected);
        assert_eq!(key.week, WeekNumber::First);
    }

    #[test]
    fn test_week_view_and_render() {
        let mut board = Board::new(default_grid());
        let key = UserScheduleKey::new("혀니", WeekNumber::First, "FRIDAY");
        board.set_user_schedule_text(&key, "21시").unwrap();

        let info = WeekInfo::current();
        let view = week_view(board.grid(), &info, WeekNumber::First);
        assert_eq!(view.week, 1);
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].day, "FRIDAY");
        assert!(week_view(board.grid(), &info, WeekNumber::Second).entries.is_empty());

        let rendered = render_week(board.grid(), WeekNumber::First);
        assert!(rendered.contains("FRI"));
        assert!(rendered.contains("21시"));
    }
}
