//! Output formatting for CLI commands.

use clap::ValueEnum;
use colored::Colorize;
use raidboard_grid::{CellKey, GridState};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                let mut table = Table::new(data);
                table.with(Style::modern());
                println!("{table}");
            }
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize + ?Sized>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message);
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_string())
}

// =============================================================================
// Grid
// =============================================================================

/// One cell in the JSON view of the grid.
#[derive(Debug, Serialize)]
pub struct CellView {
    pub party: String,
    pub raid: String,
    pub finished: bool,
    pub characters: Vec<String>,
}

/// JSON view of the grid.
#[derive(Debug, Serialize)]
pub struct GridView {
    pub raids: Vec<String>,
    pub parties: Vec<String>,
    pub cells: Vec<CellView>,
}

impl GridView {
    pub fn new(grid: &GridState) -> Self {
        let mut cells = Vec::new();
        for party in grid.parties() {
            for raid in grid.raids() {
                let key = CellKey::new(party.clone(), raid.name.clone());
                let occupants = grid.cell(&key);
                let finished = grid.is_finished(&key);
                if occupants.is_empty() && !finished {
                    continue;
                }
                cells.push(CellView {
                    party: party.clone(),
                    raid: raid.name.clone(),
                    finished,
                    characters: occupants.iter().map(|c| c.name.clone()).collect(),
                });
            }
        }
        Self {
            raids: grid.raids().iter().map(|r| r.name.clone()).collect(),
            parties: grid.parties().to_vec(),
            cells,
        }
    }
}

/// Party rows by raid columns. Supporters are marked with `*`, finished
/// cells with a check mark.
pub fn render_grid(grid: &GridState) -> String {
    let mut builder = Builder::default();

    let mut header = vec![String::new()];
    header.extend(grid.raids().iter().map(|r| r.name.clone()));
    builder.push_record(header);

    for party in grid.parties() {
        let mut row = vec![party.clone()];
        for raid in grid.raids() {
            let key = CellKey::new(party.clone(), raid.name.clone());
            row.push(render_cell(grid, &key));
        }
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.to_string()
}

fn render_cell(grid: &GridState, key: &CellKey) -> String {
    let mut lines: Vec<String> = grid
        .cell(key)
        .iter()
        .map(|c| {
            if c.is_supporter {
                format!("{}*", c.name)
            } else {
                c.name.clone()
            }
        })
        .collect();
    if grid.is_finished(key) {
        lines.push("✓ done".to_string());
    }
    lines.join("\n")
}
