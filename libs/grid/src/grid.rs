//! Grid State: the single in-memory aggregate of raids, parties, characters,
//! schedule cells, finish flags and user-schedule entries.
//!
//! Read access is public. Mutation is crate-internal and goes through
//! [`crate::Board`], which keeps the change tracker in step.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    AssignedCharacter, CellKey, Character, Raid, User, UserScheduleEntry, UserScheduleKey,
    WeekNumber,
};

/// user id -> week -> day -> entry
pub type UserScheduleMap = BTreeMap<String, BTreeMap<WeekNumber, BTreeMap<String, UserScheduleEntry>>>;

/// Owned building blocks of a [`GridState`], as produced by a loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridParts {
    pub raids: Vec<Raid>,
    pub parties: Vec<String>,
    pub users: Vec<User>,
    pub characters: BTreeMap<String, Vec<Character>>,
    pub cells: BTreeMap<CellKey, Vec<AssignedCharacter>>,
    pub finished: BTreeMap<CellKey, bool>,
    pub user_schedules: UserScheduleMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridState {
    raids: Vec<Raid>,
    parties: Vec<String>,
    users: Vec<User>,
    characters: BTreeMap<String, Vec<Character>>,
    cells: BTreeMap<CellKey, Vec<AssignedCharacter>>,
    finished: BTreeMap<CellKey, bool>,
    user_schedules: UserScheduleMap,
}

impl GridState {
    /// Builds a grid from loaded parts.
    ///
    /// Raids are sorted by `seq`, each user's characters by `seq`, and empty
    /// cells are dropped.
    pub fn from_parts(parts: GridParts) -> Self {
        let GridParts {
            mut raids,
            parties,
            users,
            mut characters,
            mut cells,
            finished,
            user_schedules,
        } = parts;

        raids.sort_by_key(|r| r.seq);
        for list in characters.values_mut() {
            list.sort_by_key(|c| c.seq);
        }
        cells.retain(|_, occupants| !occupants.is_empty());

        Self {
            raids,
            parties,
            users,
            characters,
            cells,
            finished,
            user_schedules,
        }
    }

    pub fn into_parts(self) -> GridParts {
        GridParts {
            raids: self.raids,
            parties: self.parties,
            users: self.users,
            characters: self.characters,
            cells: self.cells,
            finished: self.finished,
            user_schedules: self.user_schedules,
        }
    }

    pub fn raids(&self) -> &[Raid] {
        &self.raids
    }

    pub fn raid(&self, name: &str) -> Option<&Raid> {
        self.raids.iter().find(|r| r.name == name)
    }

    pub fn parties(&self) -> &[String] {
        &self.parties
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.name == user_id) || self.characters.contains_key(user_id)
    }

    pub fn characters(&self) -> &BTreeMap<String, Vec<Character>> {
        &self.characters
    }

    pub fn user_characters(&self, user_id: &str) -> &[Character] {
        self.characters.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_character(&self, user_id: &str, name: &str) -> Option<&Character> {
        self.user_characters(user_id).iter().find(|c| c.name == name)
    }

    pub fn cells(&self) -> &BTreeMap<CellKey, Vec<AssignedCharacter>> {
        &self.cells
    }

    /// Occupants of `key`; empty when the cell has no entry.
    pub fn cell(&self, key: &CellKey) -> &[AssignedCharacter] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn finished(&self) -> &BTreeMap<CellKey, bool> {
        &self.finished
    }

    pub fn is_finished(&self, key: &CellKey) -> bool {
        self.finished.get(key).copied().unwrap_or(false)
    }

    /// Distinct raids in which a character with this name is placed.
    pub fn character_raids(&self, name: &str) -> BTreeSet<&str> {
        self.cells
            .iter()
            .filter(|(_, occupants)| occupants.iter().any(|c| c.name == name))
            .map(|(key, _)| key.raid.as_str())
            .collect()
    }

    pub fn user_schedules(&self) -> &UserScheduleMap {
        &self.user_schedules
    }

    pub fn user_schedule(&self, key: &UserScheduleKey) -> Option<&UserScheduleEntry> {
        self.user_schedules
            .get(&key.user_id)?
            .get(&key.week)?
            .get(&key.day)
    }

    pub fn is_known_cell(&self, key: &CellKey) -> bool {
        self.parties.iter().any(|p| *p == key.party) && self.raid(&key.raid).is_some()
    }

    pub(crate) fn place(&mut self, key: &CellKey, assigned: AssignedCharacter) {
        self.cells.entry(key.clone()).or_default().push(assigned);
    }

    /// Splices one occupant out; the cell entry goes away when it empties.
    pub(crate) fn remove_at(&mut self, key: &CellKey, index: usize) -> Option<AssignedCharacter> {
        let occupants = self.cells.get_mut(key)?;
        if index >= occupants.len() {
            return None;
        }
        let removed = occupants.remove(index);
        if occupants.is_empty() {
            self.cells.remove(key);
        }
        Some(removed)
    }

    /// Flips the finish flag and returns the new value.
    pub(crate) fn toggle_finished(&mut self, key: &CellKey) -> bool {
        let flag = self.finished.entry(key.clone()).or_insert(false);
        *flag = !*flag;
        *flag
    }

    /// Replaces one cell wholesale. Used to carry pending local edits over a reload.
    pub(crate) fn restore_cell(
        &mut self,
        key: &CellKey,
        occupants: Vec<AssignedCharacter>,
        finished: Option<bool>,
    ) {
        if occupants.is_empty() {
            self.cells.remove(key);
        } else {
            self.cells.insert(key.clone(), occupants);
        }
        match finished {
            Some(flag) => {
                self.finished.insert(key.clone(), flag);
            }
            None => {
                self.finished.remove(key);
            }
        }
    }

    pub(crate) fn characters_mut(&mut self, user_id: &str) -> Option<&mut Vec<Character>> {
        self.characters.get_mut(user_id)
    }

    pub(crate) fn push_character(&mut self, character: Character) {
        self.characters
            .entry(character.user_id.clone())
            .or_default()
            .push(character);
    }

    pub(crate) fn set_raids(&mut self, mut raids: Vec<Raid>) {
        raids.sort_by_key(|r| r.seq);
        self.raids = raids;
    }

    pub(crate) fn raids_mut(&mut self) -> &mut Vec<Raid> {
        &mut self.raids
    }

    pub(crate) fn set_parties(&mut self, parties: Vec<String>) {
        self.parties = parties;
    }

    /// Drops every cell and finish flag of `raid`, returning the cleared keys.
    pub(crate) fn clear_raid(&mut self, raid: &str) -> Vec<CellKey> {
        let cleared: Vec<CellKey> = self
            .cells
            .keys()
            .chain(self.finished.keys())
            .filter(|key| key.raid == raid)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.cells.retain(|key, _| key.raid != raid);
        self.finished.retain(|key, _| key.raid != raid);
        cleared
    }

    /// Entry for `key`, created as the default entry when missing.
    pub(crate) fn user_schedule_mut(&mut self, key: &UserScheduleKey) -> &mut UserScheduleEntry {
        self.user_schedules
            .entry(key.user_id.clone())
            .or_default()
            .entry(key.week)
            .or_default()
            .entry(key.day.clone())
            .or_default()
    }

    pub(crate) fn set_user_schedules(&mut self, schedules: UserScheduleMap) {
        self.user_schedules = schedules;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned(user: &str, name: &str, key: &CellKey) -> AssignedCharacter {
        AssignedCharacter::new(&Character::new(user, name, 1), key)
    }

    #[test]
    fn test_from_parts_sorts_and_drops_empty_cells() {
        let mut parts = GridParts {
            raids: vec![Raid::new("B", 2), Raid::new("A", 1)],
            ..GridParts::default()
        };
        parts
            .characters
            .insert("U1".into(), vec![Character::new("U1", "y", 2), Character::new("U1", "x", 1)]);
        parts.cells.insert(CellKey::new("P1", "A"), Vec::new());

        let grid = GridState::from_parts(parts);
        assert_eq!(grid.raids()[0].name, "A");
        assert_eq!(grid.user_characters("U1")[0].name, "x");
        assert!(grid.cells().is_empty());
    }

    #[test]
    fn test_remove_last_occupant_removes_entry() {
        let key = CellKey::new("P1", "R1");
        let mut grid = GridState::default();
        grid.place(&key, assigned("U1", "X", &key));
        assert_eq!(grid.cell(&key).len(), 1);

        let removed = grid.remove_at(&key, 0).unwrap();
        assert_eq!(removed.name, "X");
        assert!(!grid.cells().contains_key(&key));
        assert!(grid.remove_at(&key, 0).is_none());
    }

    #[test]
    fn test_character_raids_counts_distinct_raids() {
        let mut grid = GridState::default();
        for (party, raid) in [("P1", "R1"), ("P1", "R2"), ("P2", "R2")] {
            let key = CellKey::new(party, raid);
            grid.place(&key, assigned("U1", "X", &key));
        }
        let raids = grid.character_raids("X");
        assert_eq!(raids.len(), 2);
        assert!(raids.contains("R1") && raids.contains("R2"));
    }

    #[test]
    fn test_clear_raid_removes_cells_and_flags() {
        let mut grid = GridState::default();
        let occupied = CellKey::new("P1", "R1");
        let flagged = CellKey::new("P2", "R1");
        let kept = CellKey::new("P1", "R2");
        grid.place(&occupied, assigned("U1", "X", &occupied));
        grid.place(&kept, assigned("U1", "X", &kept));
        grid.toggle_finished(&flagged);

        let cleared = grid.clear_raid("R1");
        assert_eq!(cleared, vec![occupied.clone(), flagged.clone()]);
        assert!(grid.cell(&occupied).is_empty());
        assert!(!grid.is_finished(&flagged));
        assert_eq!(grid.cell(&kept).len(), 1);
    }

    #[test]
    fn test_user_schedule_mut_creates_default() {
        let mut grid = GridState::default();
        let key = UserScheduleKey::new("U1", WeekNumber::First, "수");
        assert!(grid.user_schedule(&key).is_none());
        grid.user_schedule_mut(&key).text = "21시".into();
        let entry = grid.user_schedule(&key).unwrap();
        assert_eq!(entry.text, "21시");
        assert!(entry.is_enabled);
    }
}
