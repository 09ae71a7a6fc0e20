//! # raidboard-events
//!
//! Push-channel events for raidboard.
//!
//! ## Design Principles
//!
//! - Events are notifications, not state: receivers reload instead of merging
//! - Unknown event names are ignored, never fatal
//! - Decoding is incremental and independent of chunk boundaries
//!
//! ## Event Names
//!
//! Change events are named `{entity}-{action}`:
//! - entities: `raid`, `character`, `schedule`, `user`, `user-schedule`
//! - actions: `created`, `updated`, `deleted`, `batch-saved`
//!
//! Control events: `connected`, `heartbeat`, `lastUpdated`, `week-advanced`.

mod error;
mod sse;
mod types;

pub use error::EventError;
pub use sse::{SseDecoder, SseFrame, DEFAULT_EVENT};
pub use types::*;
