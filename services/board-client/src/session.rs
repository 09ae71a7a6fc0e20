//! A board session: the single shared board plus its backend.
//!
//! Every mutation goes through the session, which hands the resulting
//! [`BoardChange`] to the save hook, if one is installed. Reloads replace
//! the board wholesale, except for keys with a pending save.

use std::sync::{Arc, Mutex, MutexGuard};

use raidboard_grid::{
    Board, BoardChange, CellKey, DropResult, GridError, GridState, PendingEdits, UserScheduleKey,
};
use raidboard_id::SessionId;
use raidboard_reconcile::ReloadGuard;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::config::Config;
use crate::error::ClientError;
use crate::loader::{self, Collection};
use crate::persistence::{save_all, AutoSaver, SaveAllError, SaveAllReport, SaveHook};

/// The board shared between the session, its saver and the live channel.
pub type SharedBoard = Arc<tokio::sync::Mutex<Board>>;

pub struct Session {
    id: SessionId,
    backend: Arc<dyn Backend>,
    board: SharedBoard,
    parties: Vec<String>,
    hook: Option<Arc<dyn SaveHook>>,
    reload_guard: Mutex<ReloadGuard>,
    reloaded: watch::Sender<u64>,
    fallbacks: Vec<Collection>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("parties", &self.parties)
            .field("auto_save", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session around an already built board.
    pub fn new(backend: Arc<dyn Backend>, board: Board, parties: Vec<String>) -> Self {
        Self {
            id: SessionId::new(),
            backend,
            board: Arc::new(tokio::sync::Mutex::new(board)),
            parties,
            hook: None,
            reload_guard: Mutex::new(ReloadGuard::new()),
            reloaded: watch::channel(0).0,
            fallbacks: Vec::new(),
        }
    }

    /// Loads the board from the backend. Collections that fail to load fall
    /// back to local defaults.
    pub async fn open(backend: Arc<dyn Backend>, parties: Vec<String>) -> Self {
        let report = loader::load_snapshot(backend.as_ref(), &parties).await;
        let mut session = Self::new(backend, Board::new(report.grid), parties);
        session.fallbacks = report.fallbacks;

        if session.fallbacks.is_empty() {
            info!(session_id = %session.id, "session opened");
        } else {
            warn!(
                session_id = %session.id,
                fallbacks = ?session.fallbacks,
                "session opened with local defaults"
            );
        }
        session
    }

    /// Installs a save hook. Later mutations are reported to it.
    pub fn with_hook(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Installs an [`AutoSaver`] built from `config` and returns it.
    pub fn enable_auto_save(&mut self, config: &Config) -> Arc<AutoSaver> {
        let saver = Arc::new(AutoSaver::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.board),
            config,
        ));
        self.hook = Some(saver.clone());
        saver
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn board(&self) -> SharedBoard {
        Arc::clone(&self.board)
    }

    pub fn parties(&self) -> &[String] {
        &self.parties
    }

    /// Collections that fell back to defaults when the session opened.
    pub fn load_fallbacks(&self) -> &[Collection] {
        &self.fallbacks
    }

    /// Counts completed reloads.
    pub fn reloads(&self) -> watch::Receiver<u64> {
        self.reloaded.subscribe()
    }

    pub fn has_auto_save(&self) -> bool {
        self.hook.is_some()
    }

    /// A copy of the current grid.
    pub async fn grid(&self) -> GridState {
        self.board.lock().await.grid().clone()
    }

    pub async fn total_changes(&self) -> usize {
        self.board.lock().await.tracker().total_changes()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn notify(&self, change: &BoardChange, board: &Board) {
        if let Some(hook) = &self.hook {
            hook.changed(change, board.tracker());
        }
    }

    async fn commit(
        &self,
        op: impl FnOnce(&mut Board) -> Result<BoardChange, GridError>,
    ) -> Result<BoardChange, GridError> {
        let mut board = self.board.lock().await;
        let change = op(&mut board)?;
        self.notify(&change, &board);
        Ok(change)
    }

    async fn commit_optional(
        &self,
        op: impl FnOnce(&mut Board) -> Option<BoardChange>,
    ) -> Option<BoardChange> {
        let mut board = self.board.lock().await;
        let change = op(&mut board)?;
        self.notify(&change, &board);
        Some(change)
    }

    async fn commit_drop(&self, op: impl FnOnce(&mut Board) -> DropResult) -> DropResult {
        let mut board = self.board.lock().await;
        let result = op(&mut board);
        if let DropResult::Applied(change) = &result {
            self.notify(change, &board);
        }
        result
    }

    pub async fn begin_character_drag(&self, user_id: &str, name: &str) -> Result<(), GridError> {
        self.board.lock().await.begin_character_drag(user_id, name)
    }

    pub async fn begin_raid_drag(&self, source_index: usize) -> Result<(), GridError> {
        self.board.lock().await.begin_raid_drag(source_index)
    }

    pub async fn begin_party_drag(&self, source_index: usize) -> Result<(), GridError> {
        self.board.lock().await.begin_party_drag(source_index)
    }

    pub async fn begin_character_order_drag(
        &self,
        user_id: &str,
        source_index: usize,
    ) -> Result<(), GridError> {
        self.board
            .lock()
            .await
            .begin_character_order_drag(user_id, source_index)
    }

    pub async fn cancel_drag(&self) {
        self.board.lock().await.cancel_drag();
    }

    pub async fn drop_on_cell(&self, key: &CellKey) -> DropResult {
        self.commit_drop(|b| b.drop_on_cell(key)).await
    }

    pub async fn drop_on_raid_header(&self, target_index: usize) -> DropResult {
        self.commit_drop(|b| b.drop_on_raid_header(target_index))
            .await
    }

    pub async fn drop_on_party_row(&self, target_index: usize) -> DropResult {
        self.commit_drop(|b| b.drop_on_party_row(target_index)).await
    }

    pub async fn drop_on_character_order(&self, owner: &str, target_index: usize) -> DropResult {
        self.commit_drop(|b| b.drop_on_character_order(owner, target_index))
            .await
    }

    /// Drags `name` onto `key` in one step.
    pub async fn place(&self, user_id: &str, name: &str, key: &CellKey) -> Result<DropResult, GridError> {
        let mut board = self.board.lock().await;
        let result = board.place(user_id, name, key)?;
        if let DropResult::Applied(change) = &result {
            self.notify(change, &board);
        }
        Ok(result)
    }

    pub async fn secondary_activate(&self, key: &CellKey, slot: Option<usize>) -> Option<BoardChange> {
        self.commit_optional(|b| b.secondary_activate(key, slot))
            .await
    }

    pub async fn double_activate(&self, key: &CellKey, index: usize) -> Option<BoardChange> {
        self.commit_optional(|b| b.double_activate(key, index))
            .await
    }

    pub async fn unassign(&self, key: &CellKey, name: &str) -> Option<BoardChange> {
        self.commit_optional(|b| b.unassign(key, name)).await
    }

    pub async fn add_character(&self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        self.commit(|b| b.add_character(user_id, name)).await
    }

    pub async fn delete_character(&self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        self.commit(|b| b.delete_character(user_id, name)).await
    }

    pub async fn toggle_supporter(&self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        self.commit(|b| b.toggle_supporter(user_id, name)).await
    }

    pub async fn add_raid(&self, name: &str) -> Result<BoardChange, GridError> {
        self.commit(|b| b.add_raid(name)).await
    }

    pub async fn delete_raid(&self, name: &str) -> Result<BoardChange, GridError> {
        self.commit(|b| b.delete_raid(name)).await
    }

    pub async fn set_user_schedule_text(
        &self,
        key: &UserScheduleKey,
        text: &str,
    ) -> Result<BoardChange, GridError> {
        self.commit(|b| b.set_user_schedule_text(key, text)).await
    }

    pub async fn toggle_user_schedule_enabled(
        &self,
        key: &UserScheduleKey,
    ) -> Result<BoardChange, GridError> {
        self.commit(|b| b.toggle_user_schedule_enabled(key)).await
    }

    // =========================================================================
    // Persistence and reload
    // =========================================================================

    /// Saves every tracked change in one pass.
    pub async fn save_all(&self) -> Result<SaveAllReport, SaveAllError> {
        save_all(self.backend.as_ref(), &self.board).await
    }

    /// Waits for every scheduled auto-save to reach the backend.
    pub async fn flush(&self) {
        if let Some(hook) = &self.hook {
            hook.flush().await;
        }
    }

    fn pending(&self) -> PendingEdits {
        self.hook
            .as_ref()
            .map(|hook| hook.pending())
            .unwrap_or_default()
    }

    fn reload_guard(&self) -> MutexGuard<'_, ReloadGuard> {
        self.reload_guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the board with fresh backend state.
    ///
    /// Returns `Ok(false)` when a reload was already running; it runs once
    /// more after it finishes instead.
    pub async fn reload(&self) -> Result<bool, ClientError> {
        if !self.reload_guard().request() {
            debug!(session_id = %self.id, "reload already running, folded into it");
            return Ok(false);
        }

        loop {
            let result = self.reload_once().await;
            let again = self.reload_guard().finish();
            if !again {
                return result.map(|()| true);
            }
            if let Err(e) = result {
                warn!(session_id = %self.id, error = %e, "reload failed, running queued reload");
            }
        }
    }

    async fn reload_once(&self) -> Result<(), ClientError> {
        let report = loader::load_snapshot(self.backend.as_ref(), &self.parties).await;
        if !report.is_complete() {
            let missing: Vec<&str> = report.fallbacks.iter().map(|c| c.as_str()).collect();
            return Err(ClientError::PartialLoad(missing.join(", ")));
        }

        let mut board = self.board.lock().await;
        let pending = self.pending();
        if !pending.is_empty() {
            debug!(
                cells = pending.cells.len(),
                user_schedules = pending.user_schedules.len(),
                "keeping local values with pending saves"
            );
        }
        let trimmed = board.replace_grid(report.grid, &pending);
        for change in &trimmed {
            self.notify(change, &board);
        }
        drop(board);
        info!(session_id = %self.id, "board reloaded");
        self.reloaded.send_modify(|count| *count += 1);
        Ok(())
    }

    /// Shifts week 2 into week 1 on the backend, then reloads user schedules.
    pub async fn advance_week(&self) -> Result<(), ClientError> {
        self.backend.advance_week().await?;
        let schedules = loader::load_user_schedules(self.backend.as_ref()).await?;

        let mut board = self.board.lock().await;
        let pending = self.pending();
        board.replace_user_schedules(schedules, &pending.user_schedules);
        info!(session_id = %self.id, "week advanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use raidboard_grid::{Violation, WeekNumber};

    use super::*;
    use crate::api::{BackendCall, MockBackend, ScheduleRecord};

    fn parties() -> Vec<String> {
        vec!["P1".to_string(), "P2".to_string()]
    }

    #[tokio::test]
    async fn test_open_and_reload() {
        let backend = Arc::new(MockBackend::seeded());
        let session = Session::open(backend.clone(), parties()).await;
        assert!(session.load_fallbacks().is_empty());

        backend
            .create_schedule(&ScheduleRecord {
                party: "P2".into(),
                raid: "노브".into(),
                character_name: "포우".into(),
                finished: false,
            })
            .await
            .unwrap();

        let reloads = session.reloads();
        assert!(session.reload().await.unwrap());
        assert_eq!(*reloads.borrow(), 1);
        let grid = session.grid().await;
        assert_eq!(grid.cell(&CellKey::new("P2", "노브"))[0].user_id, "도당");
    }

    #[tokio::test]
    async fn test_reload_keeps_state_when_backend_fails() {
        let backend = Arc::new(MockBackend::seeded());
        let session = Session::open(backend.clone(), parties()).await;
        session.add_raid("카멘").await.unwrap();

        backend.fail_on("list_raids");
        let err = session.reload().await.unwrap_err();
        assert!(matches!(err, ClientError::PartialLoad(ref what) if what == "raids"));
        assert!(session.grid().await.raid("카멘").is_some());
    }

    #[tokio::test]
    async fn test_without_hook_edits_stay_tracked() {
        let backend = Arc::new(MockBackend::seeded());
        let session = Session::open(backend.clone(), parties()).await;
        backend.clear_calls();

        let key = CellKey::new("P1", "하기르");
        let placed = session.place("혀니", "비내", &key).await.unwrap();
        assert!(matches!(placed, DropResult::Applied(_)));
        let again = session
            .place("혀니", "비내", &CellKey::new("P2", "하기르"))
            .await
            .unwrap();
        assert_eq!(again, DropResult::Rejected(Violation::DuplicateRaidOtherParty));

        assert_eq!(session.total_changes().await, 1);
        assert!(backend.calls().is_empty());

        let report = session.save_all().await.unwrap();
        assert_eq!(report.saved.len(), 1);
        assert_eq!(backend.calls_of("save_schedules").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_keeps_pending_cell() {
        let backend = Arc::new(MockBackend::seeded());
        let mut session = Session::open(backend.clone(), parties()).await;
        let config = Config {
            schedule_debounce: Duration::from_millis(500),
            ..Config::default()
        };
        session.enable_auto_save(&config);

        let key = CellKey::new("P1", "노르둠");
        session.place("샷건", "마리", &key).await.unwrap();
        session.reload().await.unwrap();
        assert_eq!(session.grid().await.cell(&key).len(), 1);

        session.flush().await;
        assert_eq!(backend.calls_of("create_schedule").len(), 1);
        session.reload().await.unwrap();
        assert_eq!(session.grid().await.cell(&key)[0].name, "마리");
    }

    #[tokio::test]
    async fn test_advance_week_reloads_user_schedules() {
        let backend = Arc::new(MockBackend::seeded());
        let session = Session::open(backend.clone(), parties()).await;
        let key = UserScheduleKey::new("혀니", WeekNumber::Second, "목");
        session.set_user_schedule_text(&key, "21시").await.unwrap();
        session.save_all().await.unwrap();

        session.advance_week().await.unwrap();
        let grid = session.grid().await;
        let moved = UserScheduleKey::new("혀니", WeekNumber::First, "목");
        assert_eq!(grid.user_schedule(&moved).unwrap().text, "21시");
        assert!(grid.user_schedule(&key).is_none());
        assert_eq!(
            backend.calls_of("advance_week"),
            vec![BackendCall::AdvanceWeek]
        );
    }
}
