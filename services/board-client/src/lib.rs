//! raidboard board client
//!
//! Keeps a local raid schedule board in step with the raidboard backend.
//!
//! ## Architecture
//!
//! - **Session**: owns the single shared board and routes every edit
//! - **Persistence**: batch save-all, or per-edit auto-save with debouncing
//! - **Live channel**: push events when available, timestamp polling when not
//! - **Backend**: HTTP client for production, in-memory mock for tests

pub mod api;
pub mod config;
pub mod error;
pub mod live;
pub mod loader;
pub mod persistence;
pub mod session;

pub use api::{ApiClient, Backend, MockBackend};
pub use config::Config;
pub use error::ClientError;
pub use live::{LiveChannel, LiveStatus, SyncMode};
pub use persistence::{AutoSaver, SaveAllError, SaveAllReport, SaveKind, SaveStep};
pub use session::{Session, SharedBoard};
