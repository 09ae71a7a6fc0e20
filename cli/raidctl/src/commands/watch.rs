//! Follow live updates.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use raidboard_client::{Config as ClientConfig, LiveChannel, LiveStatus, SyncMode};
use raidboard_reconcile::ConnectionState;
use tokio::sync::watch;

use crate::output::{print_single, render_grid, GridView, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds to wait before reconnecting a dropped push connection.
    #[arg(long, default_value_t = 5)]
    reconnect_delay: u64,

    /// Seconds between last-updated checks when push is unavailable.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,
}

impl WatchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let config = ClientConfig {
            api_url: ctx.config.api_url.clone(),
            parties: ctx.config.parties.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay),
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            auto_save: false,
            ..ClientConfig::default()
        };

        let session = Arc::new(ctx.session().await?);
        print_board(&ctx, &session.grid().await);

        let live = LiveChannel::new(Arc::clone(&session), &config);
        let mut status = live.status();
        let mut reloads = session.reloads();
        reloads.borrow_and_update();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_visible_tx, visible_rx) = watch::channel(true);
        let mut handle = tokio::spawn(live.run(visible_rx, shutdown_rx));

        loop {
            tokio::select! {
                changed = reloads.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    reloads.borrow_and_update();
                    announce("board updated");
                    print_board(&ctx, &session.grid().await);
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    announce(&describe(current));
                }
                _ = tokio::signal::ctrl_c() => {
                    break;
                }
                result = &mut handle => {
                    result?;
                    return Ok(());
                }
            }
        }

        let _ = shutdown_tx.send(true);
        handle.await?;
        Ok(())
    }
}

fn print_board(ctx: &CommandContext, grid: &raidboard_grid::GridState) {
    match ctx.format {
        OutputFormat::Table => println!("{}", render_grid(grid)),
        OutputFormat::Json => print_single(&GridView::new(grid)),
    }
}

fn announce(message: &str) {
    eprintln!(
        "{} {}",
        Local::now().format("%H:%M:%S").to_string().dimmed(),
        message
    );
}

fn describe(status: LiveStatus) -> String {
    let state = match status.state {
        ConnectionState::Connected => "connected".green().to_string(),
        ConnectionState::Connecting => "connecting".yellow().to_string(),
        ConnectionState::BackoffWait => "reconnecting soon".yellow().to_string(),
        ConnectionState::Disconnected => "disconnected".red().to_string(),
    };
    match status.mode {
        SyncMode::Push => format!("live updates {state}"),
        SyncMode::Polling => format!("push unavailable, polling for changes ({state})"),
    }
}
