//! Loads a full board snapshot from the backend.
//!
//! Each collection is fetched on its own. A collection that fails to load
//! falls back to local defaults (users, raids, characters) or to empty
//! (schedules, user schedules), and the report says which ones did.
//! Defaults are never written back to the backend.

use std::collections::BTreeMap;
use std::fmt;

use raidboard_grid::defaults::{default_characters, default_raids, default_users};
use raidboard_grid::{
    AssignedCharacter, CellKey, Character, GridParts, GridState, UserScheduleChange,
    UserScheduleMap,
};
use tracing::{info, warn};

use crate::api::{Backend, ScheduleRecord};
use crate::error::ClientError;

/// Owner recorded for an assignment whose character is not in the roster.
pub const UNKNOWN_USER: &str = "Unknown";

/// One independently loaded collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Raids,
    Characters,
    Schedules,
    UserSchedules,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Raids => "raids",
            Collection::Characters => "characters",
            Collection::Schedules => "schedules",
            Collection::UserSchedules => "user_schedules",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a snapshot load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub grid: GridState,
    /// Collections that could not be loaded and fell back.
    pub fallbacks: Vec<Collection>,
}

impl LoadReport {
    /// Whether every collection came from the backend.
    pub fn is_complete(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

/// Loads users, raids, characters, schedules and user schedules, in that order.
pub async fn load_snapshot(backend: &dyn Backend, parties: &[String]) -> LoadReport {
    let mut fallbacks = Vec::new();

    let users = backend.list_users().await.unwrap_or_else(|e| {
        fall_back(&mut fallbacks, Collection::Users, &e);
        default_users()
    });

    let raids = backend.list_raids().await.unwrap_or_else(|e| {
        fall_back(&mut fallbacks, Collection::Raids, &e);
        default_raids()
    });

    let characters = match backend.list_characters().await {
        Ok(list) => group_characters(list),
        Err(e) => {
            fall_back(&mut fallbacks, Collection::Characters, &e);
            default_characters()
        }
    };

    let (cells, finished) = match backend.list_schedules().await {
        Ok(records) => group_schedules(records, &characters),
        Err(e) => {
            fall_back(&mut fallbacks, Collection::Schedules, &e);
            Default::default()
        }
    };

    let user_schedules = match backend.list_user_schedules().await {
        Ok(changes) => group_user_schedules(changes),
        Err(e) => {
            fall_back(&mut fallbacks, Collection::UserSchedules, &e);
            UserScheduleMap::new()
        }
    };

    let grid = GridState::from_parts(GridParts {
        raids,
        parties: parties.to_vec(),
        users,
        characters,
        cells,
        finished,
        user_schedules,
    });

    info!(
        raids = grid.raids().len(),
        users = grid.users().len(),
        cells = grid.cells().len(),
        fallbacks = fallbacks.len(),
        "board snapshot loaded"
    );

    LoadReport { grid, fallbacks }
}

/// Loads only the user schedules.
pub async fn load_user_schedules(backend: &dyn Backend) -> Result<UserScheduleMap, ClientError> {
    Ok(group_user_schedules(backend.list_user_schedules().await?))
}

fn fall_back(fallbacks: &mut Vec<Collection>, collection: Collection, error: &ClientError) {
    warn!(collection = %collection, error = %error, "load failed, using fallback");
    fallbacks.push(collection);
}

/// Groups a flat character list by owning user.
pub fn group_characters(characters: Vec<Character>) -> BTreeMap<String, Vec<Character>> {
    let mut grouped: BTreeMap<String, Vec<Character>> = BTreeMap::new();
    for character in characters {
        grouped
            .entry(character.user_id.clone())
            .or_default()
            .push(character);
    }
    grouped
}

type Cells = (
    BTreeMap<CellKey, Vec<AssignedCharacter>>,
    BTreeMap<CellKey, bool>,
);

/// Groups flat schedule records into cells.
///
/// Owner and supporter flag come from the roster. A finished flag on any
/// record of a cell marks the whole cell finished.
pub fn group_schedules(
    records: Vec<ScheduleRecord>,
    characters: &BTreeMap<String, Vec<Character>>,
) -> Cells {
    let mut cells: BTreeMap<CellKey, Vec<AssignedCharacter>> = BTreeMap::new();
    let mut finished = BTreeMap::new();

    for record in records {
        let key = record.key();
        if record.finished {
            finished.insert(key.clone(), true);
        }

        let character = characters
            .values()
            .flatten()
            .find(|c| c.name == record.character_name)
            .cloned()
            .unwrap_or_else(|| Character::new(UNKNOWN_USER, record.character_name.clone(), 0));

        let occupants = cells.entry(key.clone()).or_default();
        if occupants.iter().all(|c| c.name != character.name) {
            occupants.push(AssignedCharacter::new(&character, &key));
        }
    }

    (cells, finished)
}

/// Groups flat user-schedule records by user, week and day.
pub fn group_user_schedules(changes: Vec<UserScheduleChange>) -> UserScheduleMap {
    let mut map = UserScheduleMap::new();
    for change in changes {
        map.entry(change.key.user_id)
            .or_default()
            .entry(change.key.week)
            .or_default()
            .insert(change.key.day, change.entry);
    }
    map
}

#[cfg(test)]
mod tests {
    use raidboard_grid::{Raid, User, UserScheduleEntry, UserScheduleKey, WeekNumber};

    use super::*;
    use crate::api::MockBackend;

    fn parties() -> Vec<String> {
        vec!["1파티".to_string(), "2파티".to_string()]
    }

    fn record(party: &str, raid: &str, name: &str, finished: bool) -> ScheduleRecord {
        ScheduleRecord {
            party: party.to_string(),
            raid: raid.to_string(),
            character_name: name.to_string(),
            finished,
        }
    }

    #[tokio::test]
    async fn test_load_groups_schedules() {
        let backend = MockBackend::seeded().with_schedules(vec![
            record("1파티", "하기르", "비내", false),
            record("1파티", "하기르", "마리", true),
            record("2파티", "노브", "유령", false),
        ]);

        let report = load_snapshot(&backend, &parties()).await;
        assert!(report.is_complete());

        let grid = report.grid;
        let key = CellKey::new("1파티", "하기르");
        let names: Vec<&str> = grid.cell(&key).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["비내", "마리"]);
        assert_eq!(grid.cell(&key)[1].user_id, "샷건");
        assert!(grid.is_finished(&key));

        let ghost = &grid.cell(&CellKey::new("2파티", "노브"))[0];
        assert_eq!(ghost.user_id, UNKNOWN_USER);
        assert!(!ghost.is_supporter);
        assert!(!grid.is_finished(&CellKey::new("2파티", "노브")));
    }

    #[tokio::test]
    async fn test_load_falls_back_per_collection() {
        let backend = MockBackend::new()
            .with_users(vec![User::new("solo", "#000000")])
            .with_raids(vec![Raid::new("B", 2), Raid::new("A", 1)]);
        backend.fail_on("list_characters");
        backend.fail_on("list_schedules");

        let report = load_snapshot(&backend, &parties()).await;
        assert_eq!(
            report.fallbacks,
            vec![Collection::Characters, Collection::Schedules]
        );
        assert_eq!(report.grid.users().len(), 1);
        let raids: Vec<&str> = report.grid.raids().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(raids, vec!["A", "B"]);
        assert_eq!(report.grid.user_characters("혀니").len(), 2);
        assert!(report.grid.cells().is_empty());
        assert!(backend.writes().is_empty());
    }

    #[tokio::test]
    async fn test_load_offline_uses_defaults() {
        let backend = MockBackend::failing();
        let report = load_snapshot(&backend, &parties()).await;
        assert_eq!(report.fallbacks.len(), 5);
        assert_eq!(report.grid.raids().len(), 4);
        assert_eq!(report.grid.users().len(), 3);
    }

    #[test]
    fn test_group_user_schedules() {
        let change = UserScheduleChange {
            key: UserScheduleKey::new("도당", WeekNumber::Second, "토"),
            entry: UserScheduleEntry {
                text: "오후".to_string(),
                is_enabled: false,
            },
        };
        let map = group_user_schedules(vec![change.clone()]);
        assert_eq!(map["도당"][&WeekNumber::Second]["토"], change.entry);
    }
}
