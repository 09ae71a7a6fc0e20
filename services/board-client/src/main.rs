//! raidboard sync daemon
//!
//! Opens a board session against the backend and keeps it reconciled with
//! server-side changes until interrupted.
//!
//! - **Session**: loads the board, falling back to defaults per collection
//! - **Auto-save**: persists local edits as they happen (when enabled)
//! - **Live channel**: push events, or last-updated polling as a fallback

use std::sync::Arc;

use anyhow::Result;
use raidboard_client::{ApiClient, Backend, Config, LiveChannel, Session};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        api_url = %config.api_url,
        auto_save = config.auto_save,
        parties = config.parties.len(),
        "Starting raidboard sync"
    );

    let backend: Arc<dyn Backend> = Arc::new(ApiClient::from_config(&config)?);
    let mut session = Session::open(backend, config.parties.clone()).await;
    if !session.load_fallbacks().is_empty() {
        warn!(fallbacks = ?session.load_fallbacks(), "Some collections use local defaults");
    }

    let saver = config.auto_save.then(|| session.enable_auto_save(&config));
    let session = Arc::new(session);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Headless: always visible.
    let (_visible_tx, visible_rx) = watch::channel(true);

    let mut live = LiveChannel::new(Arc::clone(&session), &config);
    if let Some(saver) = &saver {
        live = live.with_save_events(saver.subscribe());
    }

    let status_handle = tokio::spawn({
        let mut status = live.status();
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            loop {
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *status.borrow_and_update();
                        info!(
                            connected = current.connected,
                            mode = current.mode.as_str(),
                            state = ?current.state,
                            "Live status changed"
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    });

    let mut live_handle = tokio::spawn(live.run(visible_rx, shutdown_rx));

    let live_exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
        result = &mut live_handle => {
            match result {
                Ok(()) => warn!("Live channel exited"),
                Err(e) => error!(error = %e, "Live channel task panicked"),
            }
            true
        }
    };

    let _ = shutdown_tx.send(true);

    info!("Flushing pending saves...");
    session.flush().await;
    if let Some(saver) = &saver {
        let status = saver.status();
        if status.has_any_error() {
            for (kind, state) in status.snapshot() {
                if let Some(message) = state.last_error {
                    error!(kind = %kind, error = %message, "Last save failed");
                }
            }
        }
    }

    if !live_exited {
        if let Err(e) = live_handle.await {
            error!(error = %e, "Live channel task panicked");
        }
    }
    let _ = status_handle.await;

    info!("raidboard sync shutdown complete");
    Ok(())
}
