//! In-memory [`Backend`] for tests and offline runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use raidboard_events::SyncEvent;
use raidboard_grid::defaults::{default_characters, default_raids, default_users};
use raidboard_grid::{
    CellKey, Character, Raid, RaidOrder, User, UserScheduleChange, UserScheduleKey, WeekNumber,
};
use raidboard_reconcile::ServerTimestamp;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Backend, EventStream, ScheduleRecord, ScheduleSnapshot};
use crate::error::ClientError;

/// Epoch of the first mock last-updated value: 2026-10-17T09:00:00Z.
const BASE_EPOCH_MILLIS: i64 = 1_792_227_600_000;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    ListRaids,
    CreateRaid { name: String, seq: Option<i32> },
    DeleteRaid(String),
    ReorderRaids(Vec<RaidOrder>),
    ReorderRaid(RaidOrder),
    ListCharacters,
    CreateCharacter(Character),
    UpdateCharacter(Character),
    DeleteCharacter(String),
    UpsertCharacters(Vec<Character>),
    ListSchedules,
    CreateSchedule(ScheduleRecord),
    SaveSchedules(ScheduleSnapshot),
    DeleteSchedules(CellKey),
    ListUsers,
    CreateUser(User),
    UpdateUser(User),
    DeleteUser(String),
    ListUserSchedules,
    UpsertUserSchedule(UserScheduleChange),
    SaveUserSchedules(Vec<UserScheduleChange>),
    AdvanceWeek,
    LastUpdated,
    Subscribe,
}

impl BackendCall {
    /// Operation name, as accepted by [`MockBackend::fail_on`].
    pub fn op(&self) -> &'static str {
        match self {
            BackendCall::ListRaids => "list_raids",
            BackendCall::CreateRaid { .. } => "create_raid",
            BackendCall::DeleteRaid(_) => "delete_raid",
            BackendCall::ReorderRaids(_) => "reorder_raids",
            BackendCall::ReorderRaid(_) => "reorder_raid",
            BackendCall::ListCharacters => "list_characters",
            BackendCall::CreateCharacter(_) => "create_character",
            BackendCall::UpdateCharacter(_) => "update_character",
            BackendCall::DeleteCharacter(_) => "delete_character",
            BackendCall::UpsertCharacters(_) => "upsert_characters",
            BackendCall::ListSchedules => "list_schedules",
            BackendCall::CreateSchedule(_) => "create_schedule",
            BackendCall::SaveSchedules(_) => "save_schedules",
            BackendCall::DeleteSchedules(_) => "delete_schedules",
            BackendCall::ListUsers => "list_users",
            BackendCall::CreateUser(_) => "create_user",
            BackendCall::UpdateUser(_) => "update_user",
            BackendCall::DeleteUser(_) => "delete_user",
            BackendCall::ListUserSchedules => "list_user_schedules",
            BackendCall::UpsertUserSchedule(_) => "upsert_user_schedule",
            BackendCall::SaveUserSchedules(_) => "save_user_schedules",
            BackendCall::AdvanceWeek => "advance_week",
            BackendCall::LastUpdated => "last_updated",
            BackendCall::Subscribe => "subscribe",
        }
    }

    /// Whether the call only reads.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            BackendCall::ListRaids
                | BackendCall::ListCharacters
                | BackendCall::ListSchedules
                | BackendCall::ListUsers
                | BackendCall::ListUserSchedules
                | BackendCall::LastUpdated
                | BackendCall::Subscribe
        )
    }
}

type PushSender = mpsc::UnboundedSender<Result<SyncEvent, ClientError>>;

#[derive(Debug, Default)]
struct MockState {
    raids: Vec<Raid>,
    characters: Vec<Character>,
    schedules: Vec<ScheduleRecord>,
    users: Vec<User>,
    user_schedules: Vec<UserScheduleChange>,
    version: i64,
    calls: Vec<BackendCall>,
    failures: BTreeSet<&'static str>,
    fail_all: bool,
    delays: BTreeMap<&'static str, Duration>,
    push: Option<PushSender>,
}

/// In-memory backend.
///
/// Records every call, can fail chosen operations, and lets tests push
/// events into the open subscription.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Create an empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock backend that fails every call.
    pub fn failing() -> Self {
        let backend = Self::new();
        backend.lock().fail_all = true;
        backend
    }

    /// Create a mock backend holding the built-in users, raids and characters.
    pub fn seeded() -> Self {
        Self::new()
            .with_users(default_users())
            .with_raids(default_raids())
            .with_characters(default_characters().into_values().flatten().collect())
    }

    pub fn with_raids(self, raids: Vec<Raid>) -> Self {
        self.lock().raids = raids;
        self
    }

    pub fn with_characters(self, characters: Vec<Character>) -> Self {
        self.lock().characters = characters;
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        self.lock().users = users;
        self
    }

    pub fn with_schedules(self, schedules: Vec<ScheduleRecord>) -> Self {
        self.lock().schedules = schedules;
        self
    }

    pub fn with_user_schedules(self, changes: Vec<UserScheduleChange>) -> Self {
        self.lock().user_schedules = changes;
        self
    }

    /// Makes every later call of `op` fail with a 500.
    pub fn fail_on(&self, op: &'static str) {
        self.lock().failures.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.lock().failures.remove(op);
    }

    /// Makes every later read of `op` take `delay` before answering.
    pub fn delay_on(&self, op: &'static str, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn recover_all(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.fail_all = false;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls of one operation.
    pub fn calls_of(&self, op: &str) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    /// Recorded calls that change server state.
    pub fn writes(&self) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| !c.is_read())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn raids(&self) -> Vec<Raid> {
        let mut raids = self.lock().raids.clone();
        raids.sort_by_key(|r| r.seq);
        raids
    }

    pub fn characters(&self) -> Vec<Character> {
        self.lock().characters.clone()
    }

    pub fn schedules(&self) -> Vec<ScheduleRecord> {
        self.lock().schedules.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn user_schedules(&self) -> Vec<UserScheduleChange> {
        self.lock().user_schedules.clone()
    }

    /// Simulates a change made by another client: the last-updated
    /// timestamp moves forward.
    pub fn touch(&self) {
        self.lock().version += 1;
    }

    /// Sends an event to the open subscription. Returns false when none is open.
    pub fn push_event(&self, event: SyncEvent) -> bool {
        self.send(Ok(event))
    }

    /// Fails the open subscription with a stream error.
    pub fn break_stream(&self, message: &str) -> bool {
        self.send(Err(ClientError::Stream(message.to_string())))
    }

    /// Closes the open subscription; its stream ends.
    pub fn close_stream(&self) -> bool {
        self.lock().push.take().is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .push
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, item: Result<SyncEvent, ClientError>) -> bool {
        let state = self.lock();
        match &state.push {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps for the delay configured for `op`, if any.
    async fn latency(&self, op: &str) {
        let delay = self.lock().delays.get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Records `call` and fails it when configured to.
    fn enter(&self, call: BackendCall) -> Result<MutexGuard<'_, MockState>, ClientError> {
        let mut state = self.lock();
        let op = call.op();
        debug!(op, "[MOCK] backend call");
        state.calls.push(call);
        if state.fail_all || state.failures.contains(op) {
            return Err(ClientError::api(500, format!("mock failure in {op}")));
        }
        Ok(state)
    }

    /// Like [`enter`](Self::enter), for calls that mutate server state.
    fn enter_write(&self, call: BackendCall) -> Result<MutexGuard<'_, MockState>, ClientError> {
        let mut state = self.enter(call)?;
        state.version += 1;
        Ok(state)
    }
}

fn conflict(what: &str, name: &str) -> ClientError {
    ClientError::api(409, format!("{what} {name} already exists"))
}

fn not_found(what: &str, name: &str) -> ClientError {
    ClientError::api(404, format!("{what} {name} not found"))
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_raids(&self) -> Result<Vec<Raid>, ClientError> {
        self.latency("list_raids").await;
        let state = self.enter(BackendCall::ListRaids)?;
        let mut raids = state.raids.clone();
        raids.sort_by_key(|r| r.seq);
        Ok(raids)
    }

    async fn create_raid(&self, name: &str, seq: Option<i32>) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::CreateRaid {
            name: name.to_string(),
            seq,
        })?;
        if state.raids.iter().any(|r| r.name == name) {
            return Err(conflict("raid", name));
        }
        let seq = seq.unwrap_or_else(|| state.raids.iter().map(|r| r.seq).max().unwrap_or(0) + 1);
        state.raids.push(Raid::new(name, seq));
        Ok(())
    }

    async fn delete_raid(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::DeleteRaid(name.to_string()))?;
        let before = state.raids.len();
        state.raids.retain(|r| r.name != name);
        if state.raids.len() == before {
            return Err(not_found("raid", name));
        }
        state.schedules.retain(|s| s.raid != name);
        Ok(())
    }

    async fn reorder_raids(&self, order: &[RaidOrder]) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::ReorderRaids(order.to_vec()))?;
        for entry in order {
            if let Some(raid) = state.raids.iter_mut().find(|r| r.name == entry.name) {
                raid.seq = entry.seq;
            }
        }
        Ok(())
    }

    async fn reorder_raid(&self, order: &RaidOrder) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::ReorderRaid(order.clone()))?;
        let raid = state
            .raids
            .iter_mut()
            .find(|r| r.name == order.name)
            .ok_or_else(|| not_found("raid", &order.name))?;
        raid.seq = order.seq;
        Ok(())
    }

    async fn list_characters(&self) -> Result<Vec<Character>, ClientError> {
        self.latency("list_characters").await;
        let state = self.enter(BackendCall::ListCharacters)?;
        Ok(state.characters.clone())
    }

    async fn create_character(&self, character: &Character) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::CreateCharacter(character.clone()))?;
        if state.characters.iter().any(|c| c.name == character.name) {
            return Err(conflict("character", &character.name));
        }
        state.characters.push(character.clone());
        Ok(())
    }

    async fn update_character(&self, character: &Character) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::UpdateCharacter(character.clone()))?;
        let existing = state
            .characters
            .iter_mut()
            .find(|c| c.name == character.name)
            .ok_or_else(|| not_found("character", &character.name))?;
        *existing = character.clone();
        Ok(())
    }

    async fn delete_character(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::DeleteCharacter(name.to_string()))?;
        let before = state.characters.len();
        state.characters.retain(|c| c.name != name);
        if state.characters.len() == before {
            return Err(not_found("character", name));
        }
        Ok(())
    }

    async fn upsert_characters(&self, characters: &[Character]) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::UpsertCharacters(characters.to_vec()))?;
        for character in characters {
            match state.characters.iter_mut().find(|c| c.name == character.name) {
                Some(existing) => *existing = character.clone(),
                None => state.characters.push(character.clone()),
            }
        }
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, ClientError> {
        self.latency("list_schedules").await;
        let state = self.enter(BackendCall::ListSchedules)?;
        Ok(state.schedules.clone())
    }

    async fn create_schedule(&self, record: &ScheduleRecord) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::CreateSchedule(record.clone()))?;
        state.schedules.push(record.clone());
        Ok(())
    }

    async fn save_schedules(&self, snapshot: &ScheduleSnapshot) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::SaveSchedules(snapshot.clone()))?;
        state.schedules = snapshot
            .cells
            .iter()
            .flat_map(|(key, occupants)| {
                let finished = snapshot.finished.get(key).copied().unwrap_or(false);
                occupants.iter().map(move |c| ScheduleRecord {
                    party: key.party.clone(),
                    raid: key.raid.clone(),
                    character_name: c.name.clone(),
                    finished,
                })
            })
            .collect();
        Ok(())
    }

    async fn delete_schedules(&self, key: &CellKey) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::DeleteSchedules(key.clone()))?;
        state
            .schedules
            .retain(|s| !(s.party == key.party && s.raid == key.raid));
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        self.latency("list_users").await;
        let state = self.enter(BackendCall::ListUsers)?;
        Ok(state.users.clone())
    }

    async fn create_user(&self, user: &User) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::CreateUser(user.clone()))?;
        if state.users.iter().any(|u| u.name == user.name) {
            return Err(conflict("user", &user.name));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::UpdateUser(user.clone()))?;
        let existing = state
            .users
            .iter_mut()
            .find(|u| u.name == user.name)
            .ok_or_else(|| not_found("user", &user.name))?;
        *existing = user.clone();
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::DeleteUser(name.to_string()))?;
        let before = state.users.len();
        state.users.retain(|u| u.name != name);
        if state.users.len() == before {
            return Err(not_found("user", name));
        }
        Ok(())
    }

    async fn list_user_schedules(&self) -> Result<Vec<UserScheduleChange>, ClientError> {
        self.latency("list_user_schedules").await;
        let state = self.enter(BackendCall::ListUserSchedules)?;
        Ok(state.user_schedules.clone())
    }

    async fn upsert_user_schedule(&self, change: &UserScheduleChange) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::UpsertUserSchedule(change.clone()))?;
        upsert_entry(&mut state.user_schedules, change);
        Ok(())
    }

    async fn save_user_schedules(&self, changes: &[UserScheduleChange]) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::SaveUserSchedules(changes.to_vec()))?;
        for change in changes {
            upsert_entry(&mut state.user_schedules, change);
        }
        Ok(())
    }

    async fn advance_week(&self) -> Result<(), ClientError> {
        let mut state = self.enter_write(BackendCall::AdvanceWeek)?;
        state.user_schedules = state
            .user_schedules
            .iter()
            .filter(|c| c.key.week == WeekNumber::Second)
            .map(|c| UserScheduleChange {
                key: UserScheduleKey::new(c.key.user_id.clone(), WeekNumber::First, c.key.day.clone()),
                entry: c.entry.clone(),
            })
            .collect();
        Ok(())
    }

    async fn last_updated(&self) -> Result<ServerTimestamp, ClientError> {
        let state = self.enter(BackendCall::LastUpdated)?;
        Ok(ServerTimestamp::from_epoch_millis(
            BASE_EPOCH_MILLIS + state.version * 1000,
        )?)
    }

    async fn subscribe(&self) -> Result<EventStream, ClientError> {
        let mut state = self.enter(BackendCall::Subscribe)?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.push = Some(tx);

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

fn upsert_entry(entries: &mut Vec<UserScheduleChange>, change: &UserScheduleChange) {
    match entries.iter_mut().find(|c| c.key == change.key) {
        Some(existing) => existing.entry = change.entry.clone(),
        None => entries.push(change.clone()),
    }
}
