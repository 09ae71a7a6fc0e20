//! Backend interface.
//!
//! The [`Backend`] trait covers every operation the board needs from the
//! server. [`ApiClient`] talks HTTP; [`MockBackend`] keeps everything in
//! memory for tests and offline runs.

mod http;
mod mock;
pub mod wire;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use raidboard_events::SyncEvent;
use raidboard_grid::{
    AssignedCharacter, CellKey, Character, Raid, RaidOrder, User, UserScheduleChange,
};
use raidboard_reconcile::ServerTimestamp;

use crate::error::ClientError;

pub use http::ApiClient;
pub use mock::{BackendCall, MockBackend};

/// Push events as they arrive. The stream ends when the connection closes.
pub type EventStream = BoxStream<'static, Result<SyncEvent, ClientError>>;

/// One persisted assignment, as the backend lists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub party: String,
    pub raid: String,
    pub character_name: String,
    pub finished: bool,
}

impl ScheduleRecord {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.party.clone(), self.raid.clone())
    }
}

/// Whole-board schedule state for the batch save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSnapshot {
    pub cells: BTreeMap<CellKey, Vec<AssignedCharacter>>,
    pub finished: BTreeMap<CellKey, bool>,
}

/// Server-side board operations.
#[async_trait]
pub trait Backend: Send + Sync {
    // Raids

    /// All raids, sorted by `seq`.
    async fn list_raids(&self) -> Result<Vec<Raid>, ClientError>;

    /// Creates a raid; the server assigns `seq` when none is given.
    async fn create_raid(&self, name: &str, seq: Option<i32>) -> Result<(), ClientError>;

    async fn delete_raid(&self, name: &str) -> Result<(), ClientError>;

    /// Applies a full order in one call.
    async fn reorder_raids(&self, order: &[RaidOrder]) -> Result<(), ClientError>;

    /// Moves a single raid to `seq`.
    async fn reorder_raid(&self, order: &RaidOrder) -> Result<(), ClientError>;

    // Characters

    async fn list_characters(&self) -> Result<Vec<Character>, ClientError>;

    async fn create_character(&self, character: &Character) -> Result<(), ClientError>;

    async fn update_character(&self, character: &Character) -> Result<(), ClientError>;

    async fn delete_character(&self, name: &str) -> Result<(), ClientError>;

    async fn upsert_characters(&self, characters: &[Character]) -> Result<(), ClientError>;

    // Schedules

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, ClientError>;

    async fn create_schedule(&self, record: &ScheduleRecord) -> Result<(), ClientError>;

    async fn save_schedules(&self, snapshot: &ScheduleSnapshot) -> Result<(), ClientError>;

    /// Removes every assignment of one cell.
    async fn delete_schedules(&self, key: &CellKey) -> Result<(), ClientError>;

    // Users

    async fn list_users(&self) -> Result<Vec<User>, ClientError>;

    async fn create_user(&self, user: &User) -> Result<(), ClientError>;

    async fn update_user(&self, user: &User) -> Result<(), ClientError>;

    async fn delete_user(&self, name: &str) -> Result<(), ClientError>;

    // User schedules

    async fn list_user_schedules(&self) -> Result<Vec<UserScheduleChange>, ClientError>;

    async fn upsert_user_schedule(&self, change: &UserScheduleChange) -> Result<(), ClientError>;

    async fn save_user_schedules(&self, changes: &[UserScheduleChange]) -> Result<(), ClientError>;

    /// Shifts week 2 into week 1 and clears week 2.
    async fn advance_week(&self) -> Result<(), ClientError>;

    // Sync

    async fn last_updated(&self) -> Result<ServerTimestamp, ClientError>;

    /// Opens the push channel.
    async fn subscribe(&self) -> Result<EventStream, ClientError>;
}
