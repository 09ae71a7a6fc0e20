//! Client error type.

use raidboard_events::EventError;
use raidboard_grid::GridError;
use raidboard_reconcile::ReconcileError;
use thiserror::Error;

/// Errors from backend calls and session operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("push stream error: {0}")]
    Stream(String),

    /// A reload could not fetch every collection; local state was kept.
    #[error("reload incomplete: could not load {0}")]
    PartialLoad(String),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Timestamp(#[from] ReconcileError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl ClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Stream(_) | ClientError::PartialLoad(_) => true,
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
