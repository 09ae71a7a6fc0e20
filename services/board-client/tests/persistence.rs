//! Persistence tests through the session: auto-save debouncing and
//! batch save ordering.

use std::sync::Arc;
use std::time::Duration;

use raidboard_client::api::{BackendCall, ScheduleRecord};
use raidboard_client::{Backend, Config, MockBackend, SaveKind, SaveStep, Session};
use raidboard_grid::defaults::{default_grid, default_parties};
use raidboard_grid::{
    Board, CellKey, DropResult, UserScheduleChange, UserScheduleEntry, UserScheduleKey, WeekNumber,
};
use rstest::rstest;

fn session(backend: &Arc<MockBackend>) -> Session {
    Session::new(backend.clone(), Board::new(default_grid()), default_parties())
}

fn auto_saving(backend: &Arc<MockBackend>) -> Session {
    let config = Config {
        schedule_debounce: Duration::from_millis(500),
        user_schedule_debounce: Duration::from_millis(1000),
        ..Config::default()
    };
    let mut session = session(backend);
    session.enable_auto_save(&config);
    session
}

// =============================================================================
// Auto-save
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_user_schedule_edits_coalesce_to_last_value() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);
    let key = UserScheduleKey::new("샷건", WeekNumber::First, "화");

    for text in ["2", "21", "21시"] {
        session.set_user_schedule_text(&key, text).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    assert!(backend.calls_of("upsert_user_schedule").is_empty());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(
        backend.calls_of("upsert_user_schedule"),
        vec![BackendCall::UpsertUserSchedule(UserScheduleChange {
            key: key.clone(),
            entry: UserScheduleEntry {
                text: "21시".into(),
                is_enabled: true,
            },
        })]
    );
    assert_eq!(session.total_changes().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cells_debounce_independently() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);
    backend.clear_calls();

    session
        .place("혀니", "비내", &CellKey::new("1파티", "하기르"))
        .await
        .unwrap();
    session
        .place("샷건", "마리", &CellKey::new("2파티", "노브"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.calls_of("delete_schedules").len(), 2);
    assert_eq!(backend.calls_of("create_schedule").len(), 2);
    assert_eq!(backend.schedules().len(), 2);
    assert!(!session.board().lock().await.tracker().schedule_changed());
}

#[tokio::test(start_paused = true)]
async fn test_failed_cell_keeps_schedule_dirty_after_other_cell_saves() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);

    backend.fail_on("create_schedule");
    session
        .place("혀니", "비내", &CellKey::new("1파티", "하기르"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    backend.recover("create_schedule");

    session
        .place("샷건", "샷건", &CellKey::new("2파티", "노브"))
        .await
        .unwrap();
    session.flush().await;

    assert_eq!(backend.schedules().len(), 1);
    assert!(session.board().lock().await.tracker().schedule_changed());

    let report = session.save_all().await.unwrap();
    assert!(report.saved.contains(&SaveStep::Schedule));
    assert_eq!(backend.schedules().len(), 2);

    // The batch save covered the failed cell; auto-save acknowledges again.
    session
        .place("도당", "포우", &CellKey::new("3파티", "노르둠"))
        .await
        .unwrap();
    session.flush().await;
    assert!(!session.board().lock().await.tracker().schedule_changed());
}

#[tokio::test(start_paused = true)]
async fn test_resaved_cell_clears_failure() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);
    let key = CellKey::new("1파티", "하기르");

    backend.fail_on("create_schedule");
    session.place("혀니", "비내", &key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    backend.recover("create_schedule");

    session.place("도당", "포우", &key).await.unwrap();
    session.flush().await;

    assert_eq!(backend.schedules().len(), 2);
    assert!(!session.board().lock().await.tracker().schedule_changed());
}

#[tokio::test(start_paused = true)]
async fn test_deleting_unsaved_character_sends_nothing() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);

    session.add_character("도당", "새캐").await.unwrap();
    session.delete_character("도당", "새캐").await.unwrap();
    session.flush().await;

    assert!(backend.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reload_keeps_value_with_pending_save() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);
    let key = UserScheduleKey::new("도당", WeekNumber::Second, "토");

    session.set_user_schedule_text(&key, "오후").await.unwrap();
    assert!(session.reload().await.unwrap());
    assert_eq!(
        session.grid().await.user_schedule(&key).map(|e| e.text.clone()),
        Some("오후".to_string())
    );

    session.flush().await;
    assert_eq!(backend.user_schedules().len(), 1);
    assert_eq!(backend.user_schedules()[0].entry.text, "오후");
}

#[tokio::test(start_paused = true)]
async fn test_reload_drops_remote_placement_clashing_with_pending_cell() {
    let backend = Arc::new(MockBackend::seeded());
    let session = auto_saving(&backend);
    let local = CellKey::new("1파티", "하기르");
    let remote = CellKey::new("2파티", "하기르");

    session.place("혀니", "비내", &local).await.unwrap();
    backend
        .create_schedule(&ScheduleRecord {
            party: remote.party.clone(),
            raid: remote.raid.clone(),
            character_name: "비내".into(),
            finished: false,
        })
        .await
        .unwrap();

    assert!(session.reload().await.unwrap());
    let grid = session.grid().await;
    assert_eq!(grid.cell(&local).len(), 1);
    assert!(grid.cell(&remote).is_empty());
    assert_eq!(grid.character_raids("비내").len(), 1);

    session.flush().await;
    let saved: Vec<(String, String)> = backend
        .schedules()
        .into_iter()
        .map(|r| (r.party, r.character_name))
        .collect();
    assert_eq!(saved, vec![("1파티".to_string(), "비내".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_save_error_clears_on_next_attempt() {
    let backend = Arc::new(MockBackend::seeded());
    let config = Config::default();
    let mut session = session(&backend);
    let saver = session.enable_auto_save(&config);

    backend.fail_on("create_character");
    session.add_character("혀니", "건슬").await.unwrap();
    session.flush().await;
    let status = saver.status();
    assert!(status.last_error(SaveKind::Character).is_some());

    backend.recover("create_character");
    session.add_character("혀니", "블레").await.unwrap();
    session.flush().await;
    assert!(status.last_error(SaveKind::Character).is_none());
    assert!(!status.is_any_saving());
}

// =============================================================================
// Batch save
// =============================================================================

#[tokio::test]
async fn test_batch_failure_keeps_earlier_steps() {
    let backend = Arc::new(MockBackend::seeded());
    let session = session(&backend);

    session.add_raid("카멘").await.unwrap();
    session.begin_raid_drag(4).await.unwrap();
    assert!(matches!(
        session.drop_on_raid_header(0).await,
        DropResult::Applied(_)
    ));
    backend.fail_on("reorder_raids");

    let err = session.save_all().await.unwrap_err();
    assert_eq!(err.failed_step, SaveStep::RaidOrder);
    assert_eq!(err.completed, vec![SaveStep::Raids]);
    assert!(backend.raids().iter().any(|r| r.name == "카멘"));

    let board = session.board();
    let board = board.lock().await;
    assert!(board.tracker().new_raids().is_empty());
    assert!(board.tracker().raid_order_changed());
}

#[rstest]
#[case::characters("upsert_characters", SaveStep::Characters)]
#[case::schedule("save_schedules", SaveStep::Schedule)]
#[case::user_schedule("save_user_schedules", SaveStep::UserSchedule)]
#[tokio::test]
async fn test_batch_failure_names_step(#[case] op: &'static str, #[case] step: SaveStep) {
    let backend = Arc::new(MockBackend::seeded());
    let session = session(&backend);

    session.add_character("샷건", "바드").await.unwrap();
    session
        .place("도당", "포우", &CellKey::new("3파티", "노르둠"))
        .await
        .unwrap();
    session
        .set_user_schedule_text(&UserScheduleKey::new("혀니", WeekNumber::First, "금"), "X")
        .await
        .unwrap();
    backend.fail_on(op);

    let err = session.save_all().await.unwrap_err();
    assert_eq!(err.failed_step, step);
    assert!(!err.completed.contains(&step));
    assert!(err.to_string().contains(step.as_str()));
}
