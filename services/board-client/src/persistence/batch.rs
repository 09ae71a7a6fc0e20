//! Batch save: persists every tracked change in one pass.
//!
//! Steps run strictly in order and stop at the first failure. A step that
//! succeeded stays saved; the error names the step that failed.

use std::fmt;

use raidboard_grid::Character;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::api::{Backend, ScheduleSnapshot};
use crate::error::ClientError;
use crate::session::SharedBoard;

/// One step of a batch save, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SaveStep {
    Characters,
    Raids,
    RaidOrder,
    Schedule,
    UserSchedule,
}

impl SaveStep {
    pub const ALL: [SaveStep; 5] = [
        SaveStep::Characters,
        SaveStep::Raids,
        SaveStep::RaidOrder,
        SaveStep::Schedule,
        SaveStep::UserSchedule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SaveStep::Characters => "characters",
            SaveStep::Raids => "raids",
            SaveStep::RaidOrder => "raid order",
            SaveStep::Schedule => "schedule",
            SaveStep::UserSchedule => "user schedule",
        }
    }
}

impl fmt::Display for SaveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps that had something to save. Empty means there was nothing to save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveAllReport {
    pub saved: Vec<SaveStep>,
}

impl SaveAllReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

/// A batch save stopped at `failed_step`.
#[derive(Debug, Error)]
#[error("failed to save {failed_step}: {source}")]
pub struct SaveAllError {
    pub failed_step: SaveStep,
    /// Steps that were saved before the failure.
    pub completed: Vec<SaveStep>,
    #[source]
    pub source: ClientError,
}

/// Saves every tracked change: characters, raids, raid order, schedule,
/// user schedule.
pub async fn save_all(
    backend: &dyn Backend,
    board: &SharedBoard,
) -> Result<SaveAllReport, SaveAllError> {
    let mut report = SaveAllReport::default();

    for step in SaveStep::ALL {
        let result = match step {
            SaveStep::Characters => save_characters(backend, board).await,
            SaveStep::Raids => save_raids(backend, board).await,
            SaveStep::RaidOrder => save_raid_order(backend, board).await,
            SaveStep::Schedule => save_schedule(backend, board).await,
            SaveStep::UserSchedule => save_user_schedules(backend, board).await,
        };

        match result {
            Ok(true) => {
                info!(step = %step, "saved");
                report.saved.push(step);
            }
            Ok(false) => debug!(step = %step, "nothing to save"),
            Err(source) => {
                error!(step = %step, error = %source, "save failed");
                return Err(SaveAllError {
                    failed_step: step,
                    completed: report.saved,
                    source,
                });
            }
        }
    }

    if report.is_empty() {
        info!("nothing to save");
    }
    Ok(report)
}

/// New characters and every character of updated users go out in one
/// batch-upsert, then queued deletes one by one.
async fn save_characters(backend: &dyn Backend, board: &SharedBoard) -> Result<bool, ClientError> {
    let (upserts, created, users, deletes) = {
        let board = board.lock().await;
        let tracker = board.tracker();
        let grid = board.grid();

        let created = tracker.new_characters().to_vec();
        let users: Vec<String> = tracker.updated_users().iter().cloned().collect();

        let mut upserts: Vec<Character> = created
            .iter()
            .map(|c| {
                grid.find_character(&c.user_id, &c.name)
                    .cloned()
                    .unwrap_or_else(|| c.clone())
            })
            .collect();
        for user in &users {
            for character in grid.user_characters(user) {
                if upserts.iter().all(|u| u.name != character.name) {
                    upserts.push(character.clone());
                }
            }
        }

        (upserts, created, users, tracker.deleted_characters().to_vec())
    };

    if upserts.is_empty() && deletes.is_empty() {
        return Ok(false);
    }

    if !upserts.is_empty() {
        backend.upsert_characters(&upserts).await?;
        let mut board = board.lock().await;
        let tracker = board.tracker_mut();
        tracker.acknowledge_characters_created(&created);
        tracker.acknowledge_users_updated(&users);
    }

    for name in &deletes {
        backend.delete_character(name).await?;
        board
            .lock()
            .await
            .tracker_mut()
            .acknowledge_characters_deleted(std::slice::from_ref(name));
    }

    Ok(true)
}

/// Creates new raids after the highest saved `seq`, deletes queued raids,
/// then takes the raid list from the backend.
async fn save_raids(backend: &dyn Backend, board: &SharedBoard) -> Result<bool, ClientError> {
    let (created, deleted, max_seq) = {
        let board = board.lock().await;
        let tracker = board.tracker();
        let created = tracker.new_raids().to_vec();
        let max_seq = board
            .grid()
            .raids()
            .iter()
            .filter(|r| created.iter().all(|n| n.name != r.name))
            .map(|r| r.seq)
            .max()
            .unwrap_or(0);
        (created, tracker.deleted_raids().to_vec(), max_seq)
    };

    if created.is_empty() && deleted.is_empty() {
        return Ok(false);
    }

    for (seq, raid) in (max_seq + 1..).zip(&created) {
        backend.create_raid(&raid.name, Some(seq)).await?;
        board
            .lock()
            .await
            .tracker_mut()
            .acknowledge_raids_added(std::slice::from_ref(&raid.name));
    }

    for name in &deleted {
        backend.delete_raid(name).await?;
        board
            .lock()
            .await
            .tracker_mut()
            .acknowledge_raids_deleted(std::slice::from_ref(name));
    }

    let raids = backend.list_raids().await?;
    board.lock().await.replace_raids(raids);
    Ok(true)
}

async fn save_raid_order(backend: &dyn Backend, board: &SharedBoard) -> Result<bool, ClientError> {
    let order = board.lock().await.tracker().raid_order().to_vec();
    if order.is_empty() {
        return Ok(false);
    }
    backend.reorder_raids(&order).await?;
    board.lock().await.tracker_mut().acknowledge_raid_order(&order);
    Ok(true)
}

async fn save_schedule(backend: &dyn Backend, board: &SharedBoard) -> Result<bool, ClientError> {
    let (snapshot, generation) = {
        let board = board.lock().await;
        if !board.tracker().schedule_changed() {
            return Ok(false);
        }
        let snapshot = ScheduleSnapshot {
            cells: board.grid().cells().clone(),
            finished: board.grid().finished().clone(),
        };
        (snapshot, board.tracker().schedule_generation())
    };

    backend.save_schedules(&snapshot).await?;
    board.lock().await.tracker_mut().acknowledge_schedule(generation);
    Ok(true)
}

async fn save_user_schedules(backend: &dyn Backend, board: &SharedBoard) -> Result<bool, ClientError> {
    let changes = board.lock().await.tracker().changed_user_schedules().to_vec();
    if changes.is_empty() {
        return Ok(false);
    }
    backend.save_user_schedules(&changes).await?;
    board
        .lock()
        .await
        .tracker_mut()
        .acknowledge_user_schedules(&changes);
    Ok(true)
}
