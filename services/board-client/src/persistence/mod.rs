//! Persistence pipeline.
//!
//! Two modes share the same backend:
//!
//! - **Batch** ([`save_all`]): every tracked change, in a fixed step order.
//! - **Auto-save** ([`AutoSaver`]): each edit is saved as it happens, with
//!   per-key debouncing for schedule cells and user-schedule entries.
//!
//! Auto-save plugs into the session through the [`SaveHook`] capability.

mod autosave;
mod batch;
mod debounce;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use raidboard_grid::{BoardChange, ChangeTracker, PendingEdits};
use serde::Serialize;

use crate::error::ClientError;

pub use autosave::AutoSaver;
pub use batch::{save_all, SaveAllError, SaveAllReport, SaveStep};
pub use debounce::{Cancelled, Debouncer};

/// Entity class of an auto-save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveKind {
    Character,
    Schedule,
    UserSchedule,
    Raid,
}

impl SaveKind {
    pub const ALL: [SaveKind; 4] = [
        SaveKind::Character,
        SaveKind::Schedule,
        SaveKind::UserSchedule,
        SaveKind::Raid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SaveKind::Character => "character",
            SaveKind::Schedule => "schedule",
            SaveKind::UserSchedule => "userSchedule",
            SaveKind::Raid => "raid",
        }
    }
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one entity class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStatus {
    /// Saves currently in flight.
    pub in_flight: usize,
    /// Message of the most recent failure, cleared when the next save starts.
    pub last_error: Option<String>,
}

impl KindStatus {
    pub fn is_saving(&self) -> bool {
        self.in_flight > 0
    }
}

/// In-flight flags and last errors, per [`SaveKind`].
#[derive(Debug, Default)]
pub struct SaveStatus {
    kinds: Mutex<BTreeMap<SaveKind, KindStatus>>,
}

impl SaveStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a save of `kind` as started.
    pub fn begin(&self, kind: SaveKind) {
        let mut kinds = self.lock();
        let status = kinds.entry(kind).or_default();
        status.in_flight += 1;
        status.last_error = None;
    }

    /// Marks a save of `kind` as finished. The in-flight flag drops either way.
    pub fn finish(&self, kind: SaveKind, result: &Result<(), ClientError>) {
        let mut kinds = self.lock();
        let status = kinds.entry(kind).or_default();
        status.in_flight = status.in_flight.saturating_sub(1);
        if let Err(e) = result {
            status.last_error = Some(e.to_string());
        }
    }

    pub fn get(&self, kind: SaveKind) -> KindStatus {
        self.lock().get(&kind).cloned().unwrap_or_default()
    }

    pub fn is_saving(&self, kind: SaveKind) -> bool {
        self.get(kind).is_saving()
    }

    pub fn last_error(&self, kind: SaveKind) -> Option<String> {
        self.get(kind).last_error
    }

    pub fn is_any_saving(&self) -> bool {
        self.lock().values().any(KindStatus::is_saving)
    }

    pub fn has_any_error(&self) -> bool {
        self.lock().values().any(|s| s.last_error.is_some())
    }

    pub fn clear_errors(&self) {
        for status in self.lock().values_mut() {
            status.last_error = None;
        }
    }

    /// Every kind, including idle ones.
    pub fn snapshot(&self) -> BTreeMap<SaveKind, KindStatus> {
        SaveKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SaveKind, KindStatus>> {
        self.kinds.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reacts to completed board mutations.
///
/// A session holds at most one hook. Without one, edits stay in the change
/// tracker until a batch save.
#[async_trait::async_trait]
pub trait SaveHook: Send + Sync {
    /// Called after every successful mutation, while the board is still
    /// locked. Must not block.
    fn changed(&self, change: &BoardChange, tracker: &ChangeTracker);

    /// Keys with a save that is scheduled or in flight.
    fn pending(&self) -> PendingEdits;

    /// Runs every scheduled save now and waits for all in-flight saves.
    async fn flush(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flag_cleared_on_failure() {
        let status = SaveStatus::new();
        status.begin(SaveKind::Schedule);
        assert!(status.is_saving(SaveKind::Schedule));
        assert!(status.is_any_saving());

        status.finish(SaveKind::Schedule, &Err(ClientError::api(500, "boom")));
        assert!(!status.is_any_saving());
        assert!(status.has_any_error());
        assert_eq!(
            status.last_error(SaveKind::Schedule).as_deref(),
            Some("API error (500): boom")
        );

        status.begin(SaveKind::Schedule);
        assert_eq!(status.last_error(SaveKind::Schedule), None);
        status.finish(SaveKind::Schedule, &Ok(()));
        assert!(!status.has_any_error());
    }

    #[test]
    fn test_clear_errors() {
        let status = SaveStatus::new();
        status.begin(SaveKind::Raid);
        status.finish(SaveKind::Raid, &Err(ClientError::Decode("x".into())));
        status.clear_errors();
        assert!(!status.has_any_error());
        assert_eq!(status.snapshot().len(), 4);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(SaveKind::UserSchedule.to_string(), "userSchedule");
    }
}
