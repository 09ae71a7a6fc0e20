//! Auto-save: persists each board change as it happens.
//!
//! Schedule cells and user-schedule entries are debounced per key. Roster
//! and raid changes go out immediately, one lane per entity so that saves of
//! the same entity never overlap.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use raidboard_grid::{
    AssignedCharacter, BoardChange, CellKey, Character, ChangeTracker, DeleteDisposition,
    PendingEdits, RaidOrder, UserScheduleChange, UserScheduleKey,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::debounce::{Cancelled, Debouncer};
use super::{SaveHook, SaveKind, SaveStatus};
use crate::api::{Backend, ScheduleRecord};
use crate::config::Config;
use crate::error::ClientError;
use crate::session::SharedBoard;

const COMPLETION_CHANNEL_CAPACITY: usize = 64;

struct Inner {
    backend: Arc<dyn Backend>,
    board: SharedBoard,
    status: Arc<SaveStatus>,
    completed: broadcast::Sender<SaveKind>,
    /// Cells whose last save failed, with the generation of that save. The
    /// schedule flag stays set while any remain that no later save covers.
    failed_cells: Mutex<BTreeMap<CellKey, u64>>,
}

impl Inner {
    fn failed_cells(&self) -> MutexGuard<'_, BTreeMap<CellKey, u64>> {
        self.failed_cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs one save with status tracking. On success, `ack` updates the
    /// change tracker and the completion is broadcast. Returns whether the
    /// save succeeded.
    async fn run<F, A>(&self, kind: SaveKind, target: String, save: F, ack: A) -> bool
    where
        F: Future<Output = Result<(), ClientError>>,
        A: FnOnce(&mut ChangeTracker),
    {
        self.status.begin(kind);
        let result = save.await;
        self.status.finish(kind, &result);

        match result {
            Ok(()) => {
                ack(self.board.lock().await.tracker_mut());
                info!(kind = %kind, entity = %target, "auto-saved");
                let _ = self.completed.send(kind);
                true
            }
            Err(e) => {
                warn!(kind = %kind, entity = %target, error = %e, "auto-save failed");
                false
            }
        }
    }
}

/// Debounced, per-entity auto-save.
pub struct AutoSaver {
    inner: Arc<Inner>,
    cells: Arc<Debouncer<CellKey>>,
    user_schedules: Debouncer<UserScheduleKey>,
    immediate: Debouncer<String>,
}

impl std::fmt::Debug for AutoSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaver")
            .field("schedule_window", &self.cells.window())
            .field("user_schedule_window", &self.user_schedules.window())
            .finish_non_exhaustive()
    }
}

impl AutoSaver {
    pub fn new(backend: Arc<dyn Backend>, board: SharedBoard, config: &Config) -> Self {
        Self::with_windows(
            backend,
            board,
            config.schedule_debounce,
            config.user_schedule_debounce,
        )
    }

    pub fn with_windows(
        backend: Arc<dyn Backend>,
        board: SharedBoard,
        schedule_window: Duration,
        user_schedule_window: Duration,
    ) -> Self {
        let (completed, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                board,
                status: Arc::new(SaveStatus::new()),
                completed,
                failed_cells: Mutex::new(BTreeMap::new()),
            }),
            cells: Arc::new(Debouncer::new(schedule_window)),
            user_schedules: Debouncer::new(user_schedule_window),
            immediate: Debouncer::new(Duration::ZERO),
        }
    }

    pub fn status(&self) -> Arc<SaveStatus> {
        Arc::clone(&self.inner.status)
    }

    /// Receives the kind of every successful save.
    pub fn subscribe(&self) -> broadcast::Receiver<SaveKind> {
        self.inner.completed.subscribe()
    }

    fn save_cell(&self, key: CellKey, occupants: Vec<AssignedCharacter>, finished: bool, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let cells = Arc::clone(&self.cells);
        let task_key = key.clone();

        self.cells.schedule(key, async move {
            let backend = Arc::clone(&inner.backend);
            let save = async {
                backend.delete_schedules(&task_key).await?;
                for occupant in &occupants {
                    backend
                        .create_schedule(&ScheduleRecord {
                            party: task_key.party.clone(),
                            raid: task_key.raid.clone(),
                            character_name: occupant.name.clone(),
                            finished,
                        })
                        .await?;
                }
                Ok(())
            };
            let saved = inner
                .run(SaveKind::Schedule, task_key.to_string(), save, |tracker| {
                    let mut failed = inner.failed_cells();
                    failed.remove(&task_key);
                    // A batch save or reload since the failure covers it.
                    let covered = tracker.saved_schedule_generation();
                    failed.retain(|_, failed_at| *failed_at > covered);
                    // Only this save left and no failed cell outstanding:
                    // everything up to `generation` is on the server.
                    if failed.is_empty() && cells.pending_count() <= 1 {
                        tracker.acknowledge_schedule(generation);
                    }
                })
                .await;
            if !saved {
                inner.failed_cells().insert(task_key, generation);
            }
        });
    }

    fn save_user_schedule(&self, change: UserScheduleChange) {
        let inner = Arc::clone(&self.inner);
        self.user_schedules.schedule(change.key.clone(), async move {
            let save = inner.backend.upsert_user_schedule(&change);
            let saved = change.clone();
            inner
                .run(SaveKind::UserSchedule, change.key.to_string(), save, |tracker| {
                    tracker.acknowledge_user_schedules(&[saved]);
                })
                .await;
        });
    }

    fn save_now<F, A>(&self, lane: String, kind: SaveKind, save: F, ack: A)
    where
        F: Future<Output = Result<(), ClientError>> + Send + 'static,
        A: FnOnce(&mut ChangeTracker) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let target = lane.clone();
        self.immediate.schedule(lane, async move {
            inner.run(kind, target, save, ack).await;
        });
    }

    fn create_character(&self, character: Character) {
        let backend = Arc::clone(&self.inner.backend);
        let saved = character.clone();
        self.save_now(
            character_lane(&character.name),
            SaveKind::Character,
            async move { backend.create_character(&character).await },
            move |tracker| tracker.acknowledge_characters_created(&[saved]),
        );
    }

    fn delete_character(&self, name: String) {
        let backend = Arc::clone(&self.inner.backend);
        let names = vec![name.clone()];
        self.save_now(
            character_lane(&name),
            SaveKind::Character,
            async move { backend.delete_character(&name).await },
            move |tracker| tracker.acknowledge_characters_deleted(&names),
        );
    }

    fn update_characters(&self, user_id: String, characters: Vec<Character>) {
        let backend = Arc::clone(&self.inner.backend);
        let users = vec![user_id.clone()];
        self.save_now(
            format!("characters:{user_id}"),
            SaveKind::Character,
            async move { backend.upsert_characters(&characters).await },
            move |tracker| tracker.acknowledge_users_updated(&users),
        );
    }

    fn create_raid(&self, name: String, seq: i32) {
        let backend = Arc::clone(&self.inner.backend);
        let names = vec![name.clone()];
        self.save_now(
            raid_lane(&name),
            SaveKind::Raid,
            async move { backend.create_raid(&name, Some(seq)).await },
            move |tracker| tracker.acknowledge_raids_added(&names),
        );
    }

    fn delete_raid(&self, name: String) {
        let backend = Arc::clone(&self.inner.backend);
        let names = vec![name.clone()];
        self.save_now(
            raid_lane(&name),
            SaveKind::Raid,
            async move { backend.delete_raid(&name).await },
            move |tracker| tracker.acknowledge_raids_deleted(&names),
        );
    }

    /// Moves each raid to its new position, one call per raid.
    fn reorder_raids(&self, order: Vec<RaidOrder>) {
        let backend = Arc::clone(&self.inner.backend);
        let saved = order.clone();
        self.save_now(
            "raid-order".to_string(),
            SaveKind::Raid,
            async move {
                for entry in &order {
                    backend.reorder_raid(entry).await?;
                }
                Ok(())
            },
            move |tracker| tracker.acknowledge_raid_order(&saved),
        );
    }
}

fn character_lane(name: &str) -> String {
    format!("character:{name}")
}

fn raid_lane(name: &str) -> String {
    format!("raid:{name}")
}

#[async_trait]
impl SaveHook for AutoSaver {
    fn changed(&self, change: &BoardChange, tracker: &ChangeTracker) {
        match change {
            BoardChange::CellChanged {
                key,
                occupants,
                finished,
            } => self.save_cell(
                key.clone(),
                occupants.clone(),
                *finished,
                tracker.schedule_generation(),
            ),
            BoardChange::CharacterCreated(character) => self.create_character(character.clone()),
            BoardChange::CharacterDeleted {
                name, disposition, ..
            } => match disposition {
                DeleteDisposition::Queued => self.delete_character(name.clone()),
                DeleteDisposition::DroppedUnsaved => {
                    match self.immediate.cancel(&character_lane(name)) {
                        // The create is already on its way; delete right after it.
                        Cancelled::InFlight => self.delete_character(name.clone()),
                        Cancelled::Dropped | Cancelled::Idle => {
                            debug!(character = %name, "unsaved character dropped locally")
                        }
                    }
                }
            },
            BoardChange::CharactersUpdated {
                user_id,
                characters,
            } => self.update_characters(user_id.clone(), characters.clone()),
            BoardChange::RaidAdded(raid) => self.create_raid(raid.name.clone(), raid.seq),
            BoardChange::RaidDeleted {
                name,
                disposition,
                cleared_cells,
            } => {
                match disposition {
                    DeleteDisposition::Queued => self.delete_raid(name.clone()),
                    DeleteDisposition::DroppedUnsaved => {
                        if self.immediate.cancel(&raid_lane(name)) == Cancelled::InFlight {
                            self.delete_raid(name.clone());
                        }
                    }
                }
                for key in cleared_cells {
                    self.save_cell(key.clone(), Vec::new(), false, tracker.schedule_generation());
                }
            }
            BoardChange::RaidsReordered(order) => self.reorder_raids(order.clone()),
            BoardChange::PartiesReordered(_) => {}
            BoardChange::UserScheduleChanged(change) => self.save_user_schedule(change.clone()),
        }
    }

    fn pending(&self) -> PendingEdits {
        PendingEdits {
            cells: self.cells.pending_keys().into_iter().collect(),
            user_schedules: self.user_schedules.pending_keys().into_iter().collect(),
        }
    }

    async fn flush(&self) {
        self.immediate.flush().await;
        self.cells.flush().await;
        self.user_schedules.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use raidboard_grid::defaults::default_grid;
    use raidboard_grid::{Board, UserScheduleEntry, WeekNumber};
    use tokio::sync::Mutex;

    use super::*;
    use crate::api::{BackendCall, MockBackend};

    fn setup() -> (Arc<MockBackend>, SharedBoard, AutoSaver) {
        let backend = Arc::new(MockBackend::seeded());
        let board: SharedBoard = Arc::new(Mutex::new(Board::new(default_grid())));
        let saver = AutoSaver::with_windows(
            backend.clone(),
            board.clone(),
            Duration::from_millis(500),
            Duration::from_millis(1000),
        );
        (backend, board, saver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cell_save_replaces_by_key() {
        let (backend, board, saver) = setup();
        let key = CellKey::new("1파티", "하기르");
        {
            let mut board = board.lock().await;
            let change = board.place("혀니", "비내", &key).unwrap().change().unwrap();
            saver.changed(&change, board.tracker());
        }

        assert_eq!(saver.pending().cells.len(), 1);
        saver.flush().await;

        assert_eq!(
            backend.writes(),
            vec![
                BackendCall::DeleteSchedules(key.clone()),
                BackendCall::CreateSchedule(ScheduleRecord {
                    party: "1파티".into(),
                    raid: "하기르".into(),
                    character_name: "비내".into(),
                    finished: false,
                }),
            ]
        );
        assert!(!board.lock().await.tracker().schedule_changed());
        assert!(saver.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_records_error() {
        let (backend, board, saver) = setup();
        backend.fail_on("upsert_user_schedule");
        let mut completed = saver.subscribe();

        let key = UserScheduleKey::new("샷건", WeekNumber::First, "수");
        {
            let mut board = board.lock().await;
            let change = board.set_user_schedule_text(&key, "휴무").unwrap();
            saver.changed(&change, board.tracker());
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let status = saver.status();
        assert!(!status.is_any_saving());
        assert!(status.last_error(SaveKind::UserSchedule).is_some());
        assert_eq!(
            board.lock().await.tracker().changed_user_schedules().len(),
            1
        );
        assert!(completed.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_then_deleted_before_save_sends_nothing() {
        let (backend, board, saver) = setup();
        {
            let mut board = board.lock().await;
            let created = board.add_character("도당", "새캐").unwrap();
            saver.changed(&created, board.tracker());
            let deleted = board.delete_character("도당", "새캐").unwrap();
            saver.changed(&deleted, board.tracker());
        }
        saver.flush().await;
        assert!(backend.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raid_order_saved_per_raid() {
        let (backend, board, saver) = setup();
        let mut completed = saver.subscribe();
        {
            let mut board = board.lock().await;
            board.begin_raid_drag(0).unwrap();
            let change = board.drop_on_raid_header(2).change().unwrap();
            saver.changed(&change, board.tracker());
        }
        saver.flush().await;

        let reorders = backend.calls_of("reorder_raid");
        assert_eq!(reorders.len(), 4);
        assert_eq!(
            reorders[2],
            BackendCall::ReorderRaid(RaidOrder {
                name: "베히모스".into(),
                seq: 3
            })
        );
        assert_eq!(completed.recv().await.unwrap(), SaveKind::Raid);
        assert!(!board.lock().await.tracker().raid_order_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_user_schedule_acknowledged_only_if_current() {
        let (backend, board, saver) = setup();
        let key = UserScheduleKey::new("혀니", WeekNumber::Second, "일");
        {
            let mut board = board.lock().await;
            let change = board.set_user_schedule_text(&key, "저녁").unwrap();
            saver.changed(&change, board.tracker());
        }
        saver.flush().await;

        assert_eq!(
            backend.user_schedules(),
            vec![UserScheduleChange {
                key,
                entry: UserScheduleEntry {
                    text: "저녁".into(),
                    is_enabled: true
                }
            }]
        );
        assert!(board.lock().await.tracker().changed_user_schedules().is_empty());
    }
}
