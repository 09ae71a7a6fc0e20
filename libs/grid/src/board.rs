//! The `Board` aggregate: grid state, change tracker and drag machine behind
//! one set of mutators.
//!
//! Every successful mutation returns a [`BoardChange`] describing what
//! changed. Callers use it to drive persistence; the board itself never does
//! I/O.

use std::collections::BTreeSet;

use tracing::debug;

use crate::constraint::{self, Violation, MAX_RAIDS_PER_CHARACTER};
use crate::error::GridError;
use crate::grid::{GridState, UserScheduleMap};
use crate::interaction::{reorder, DragKind, DragMachine, DragPayload, DragState};
use crate::model::{
    AssignedCharacter, CellKey, Character, Raid, RaidOrder, UserScheduleChange, UserScheduleKey,
};
use crate::tracker::{ChangeTracker, DeleteDisposition};

/// A completed local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardChange {
    /// A cell's occupants or finish flag changed. Carries the new contents.
    CellChanged {
        key: CellKey,
        occupants: Vec<AssignedCharacter>,
        finished: bool,
    },
    CharacterCreated(Character),
    CharacterDeleted {
        user_id: String,
        name: String,
        disposition: DeleteDisposition,
    },
    /// A user's character list was reordered or a supporter flag flipped.
    CharactersUpdated {
        user_id: String,
        characters: Vec<Character>,
    },
    RaidAdded(Raid),
    RaidDeleted {
        name: String,
        disposition: DeleteDisposition,
        cleared_cells: Vec<CellKey>,
    },
    RaidsReordered(Vec<RaidOrder>),
    PartiesReordered(Vec<String>),
    UserScheduleChanged(UserScheduleChange),
}

/// Outcome of a drop.
#[derive(Debug, Clone, PartialEq)]
pub enum DropResult {
    Applied(BoardChange),
    Rejected(Violation),
    /// Nothing to do: no matching drag, a no-op move, or an unknown target.
    Ignored,
}

impl DropResult {
    pub fn change(self) -> Option<BoardChange> {
        match self {
            DropResult::Applied(change) => Some(change),
            DropResult::Rejected(_) | DropResult::Ignored => None,
        }
    }
}

/// Keys with a local edit that has not reached the backend yet.
///
/// A reload keeps the local values for these keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingEdits {
    pub cells: BTreeSet<CellKey>,
    pub user_schedules: BTreeSet<UserScheduleKey>,
}

impl PendingEdits {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.user_schedules.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Board {
    grid: GridState,
    tracker: ChangeTracker,
    drag: DragMachine,
}

impl Board {
    pub fn new(grid: GridState) -> Self {
        Self {
            grid,
            tracker: ChangeTracker::new(),
            drag: DragMachine::new(),
        }
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    // Drag and drop

    pub fn begin_character_drag(&mut self, user_id: &str, name: &str) -> Result<(), GridError> {
        let character = self
            .grid
            .find_character(user_id, name)
            .cloned()
            .ok_or_else(|| unknown_character(user_id, name))?;
        self.drag.start(DragPayload::Character(character));
        Ok(())
    }

    pub fn begin_raid_drag(&mut self, source_index: usize) -> Result<(), GridError> {
        let raid = self
            .grid
            .raids()
            .get(source_index)
            .ok_or(GridError::IndexOutOfRange {
                list: "raids",
                index: source_index,
                len: self.grid.raids().len(),
            })?;
        self.drag.start(DragPayload::RaidHeader {
            raid: raid.name.clone(),
            source_index,
        });
        Ok(())
    }

    pub fn begin_party_drag(&mut self, source_index: usize) -> Result<(), GridError> {
        let party = self
            .grid
            .parties()
            .get(source_index)
            .ok_or(GridError::IndexOutOfRange {
                list: "parties",
                index: source_index,
                len: self.grid.parties().len(),
            })?;
        self.drag.start(DragPayload::PartyRow {
            party: party.clone(),
            source_index,
        });
        Ok(())
    }

    pub fn begin_character_order_drag(
        &mut self,
        user_id: &str,
        source_index: usize,
    ) -> Result<(), GridError> {
        let characters = self.grid.user_characters(user_id);
        let character = characters
            .get(source_index)
            .ok_or(GridError::IndexOutOfRange {
                list: "characters",
                index: source_index,
                len: characters.len(),
            })?;
        self.drag.start(DragPayload::CharacterOrder {
            character: character.name.clone(),
            owner: user_id.to_string(),
            source_index,
        });
        Ok(())
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    /// Drops the dragged character onto `key`.
    pub fn drop_on_cell(&mut self, key: &CellKey) -> DropResult {
        let Some(DragPayload::Character(character)) = self.drag.take(DragKind::Character) else {
            return DropResult::Ignored;
        };
        if !self.grid.is_known_cell(key) {
            debug!(party = %key.party, raid = %key.raid, "drop on unknown cell");
            return DropResult::Ignored;
        }

        if let Err(violation) = constraint::evaluate(&self.grid, &character, key) {
            debug!(
                character = %character.name,
                party = %key.party,
                raid = %key.raid,
                reason = violation.code(),
                "placement rejected"
            );
            return DropResult::Rejected(violation);
        }

        self.grid.place(key, AssignedCharacter::new(&character, key));
        self.tracker.mark_schedule_changed();
        debug!(character = %character.name, party = %key.party, raid = %key.raid, "placed");
        DropResult::Applied(self.cell_changed(key))
    }

    /// Drag and drop in one step.
    pub fn place(&mut self, user_id: &str, name: &str, key: &CellKey) -> Result<DropResult, GridError> {
        self.begin_character_drag(user_id, name)?;
        Ok(self.drop_on_cell(key))
    }

    pub fn drop_on_raid_header(&mut self, target_index: usize) -> DropResult {
        let Some(DragPayload::RaidHeader { source_index, .. }) = self.drag.take(DragKind::RaidHeader)
        else {
            return DropResult::Ignored;
        };
        let Some(mut raids) = reorder(self.grid.raids(), source_index, target_index) else {
            return DropResult::Ignored;
        };

        for (i, raid) in raids.iter_mut().enumerate() {
            raid.seq = seq_for(i);
        }
        let order: Vec<RaidOrder> = raids.iter().map(RaidOrder::from).collect();
        *self.grid.raids_mut() = raids;
        self.tracker.record_raid_order(order.clone());
        DropResult::Applied(BoardChange::RaidsReordered(order))
    }

    pub fn drop_on_party_row(&mut self, target_index: usize) -> DropResult {
        let Some(DragPayload::PartyRow { source_index, .. }) = self.drag.take(DragKind::PartyRow)
        else {
            return DropResult::Ignored;
        };
        let Some(parties) = reorder(self.grid.parties(), source_index, target_index) else {
            return DropResult::Ignored;
        };
        self.grid.set_parties(parties.clone());
        DropResult::Applied(BoardChange::PartiesReordered(parties))
    }

    /// Drops a character onto a position in `owner`'s list.
    ///
    /// A drop onto another user's list is a cancel.
    pub fn drop_on_character_order(&mut self, owner: &str, target_index: usize) -> DropResult {
        let Some(DragPayload::CharacterOrder {
            owner: source_owner,
            source_index,
            ..
        }) = self.drag.take(DragKind::CharacterOrder)
        else {
            return DropResult::Ignored;
        };
        if source_owner != owner {
            debug!(from = %source_owner, to = %owner, "character moved across users; ignored");
            return DropResult::Ignored;
        }
        let Some(mut characters) =
            reorder(self.grid.user_characters(owner), source_index, target_index)
        else {
            return DropResult::Ignored;
        };

        for (i, character) in characters.iter_mut().enumerate() {
            character.seq = seq_for(i);
        }
        if let Some(list) = self.grid.characters_mut(owner) {
            *list = characters.clone();
        }
        self.tracker.record_user_updated(owner);
        DropResult::Applied(BoardChange::CharactersUpdated {
            user_id: owner.to_string(),
            characters,
        })
    }

    // Cell activation

    /// Secondary activation (right click).
    ///
    /// On the cell's empty area (`slot == None`) this toggles the finish flag.
    /// On an occupied slot it does nothing.
    pub fn secondary_activate(&mut self, key: &CellKey, slot: Option<usize>) -> Option<BoardChange> {
        if slot.is_some() {
            return None;
        }
        let finished = self.grid.toggle_finished(key);
        self.tracker.mark_schedule_changed();
        debug!(party = %key.party, raid = %key.raid, finished, "finish flag toggled");
        Some(self.cell_changed(key))
    }

    /// Double activation: removes the occupant at `index`. Allowed on finished cells.
    pub fn double_activate(&mut self, key: &CellKey, index: usize) -> Option<BoardChange> {
        let removed = self.grid.remove_at(key, index)?;
        self.tracker.mark_schedule_changed();
        debug!(character = %removed.name, party = %key.party, raid = %key.raid, "unassigned");
        Some(self.cell_changed(key))
    }

    /// Removes the named character from `key`.
    pub fn unassign(&mut self, key: &CellKey, name: &str) -> Option<BoardChange> {
        let index = self.grid.cell(key).iter().position(|c| c.name == name)?;
        self.double_activate(key, index)
    }

    // Roster editing

    pub fn add_character(&mut self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GridError::EmptyName("character"));
        }
        if !self.grid.has_user(user_id) {
            return Err(GridError::UnknownUser(user_id.to_string()));
        }
        if self.grid.find_character(user_id, name).is_some() {
            return Err(GridError::DuplicateCharacter {
                user_id: user_id.to_string(),
                name: name.to_string(),
            });
        }

        let seq = self
            .grid
            .user_characters(user_id)
            .iter()
            .map(|c| c.seq)
            .max()
            .unwrap_or(0)
            + 1;
        let character = Character::new(user_id, name, seq);
        self.grid.push_character(character.clone());
        self.tracker.record_character_created(character.clone());
        Ok(BoardChange::CharacterCreated(character))
    }

    pub fn delete_character(&mut self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        let list = self
            .grid
            .characters_mut(user_id)
            .ok_or_else(|| GridError::UnknownUser(user_id.to_string()))?;
        let index = list
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| unknown_character(user_id, name))?;
        list.remove(index);

        let disposition = self.tracker.record_character_deleted(user_id, name);
        Ok(BoardChange::CharacterDeleted {
            user_id: user_id.to_string(),
            name: name.to_string(),
            disposition,
        })
    }

    pub fn toggle_supporter(&mut self, user_id: &str, name: &str) -> Result<BoardChange, GridError> {
        let list = self
            .grid
            .characters_mut(user_id)
            .ok_or_else(|| GridError::UnknownUser(user_id.to_string()))?;
        let character = list
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| unknown_character(user_id, name))?;
        character.is_supporter = !character.is_supporter;
        let characters = list.clone();

        self.tracker.record_user_updated(user_id);
        Ok(BoardChange::CharactersUpdated {
            user_id: user_id.to_string(),
            characters,
        })
    }

    pub fn add_raid(&mut self, name: &str) -> Result<BoardChange, GridError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GridError::EmptyName("raid"));
        }
        if self.grid.raid(name).is_some() {
            return Err(GridError::DuplicateRaid(name.to_string()));
        }

        let seq = self.grid.raids().iter().map(|r| r.seq).max().unwrap_or(0) + 1;
        let raid = Raid::new(name, seq);
        self.grid.raids_mut().push(raid.clone());
        self.tracker.record_raid_added(raid.clone());
        Ok(BoardChange::RaidAdded(raid))
    }

    /// Removes a raid column together with its cells and finish flags.
    pub fn delete_raid(&mut self, name: &str) -> Result<BoardChange, GridError> {
        let index = self
            .grid
            .raids()
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| GridError::UnknownRaid(name.to_string()))?;
        self.grid.raids_mut().remove(index);

        let cleared_cells = self.grid.clear_raid(name);
        if !cleared_cells.is_empty() {
            self.tracker.mark_schedule_changed();
        }
        let disposition = self.tracker.record_raid_deleted(name);
        Ok(BoardChange::RaidDeleted {
            name: name.to_string(),
            disposition,
            cleared_cells,
        })
    }

    // User schedules

    pub fn set_user_schedule_text(
        &mut self,
        key: &UserScheduleKey,
        text: &str,
    ) -> Result<BoardChange, GridError> {
        self.edit_user_schedule(key, |entry| entry.text = text.to_string())
    }

    pub fn toggle_user_schedule_enabled(
        &mut self,
        key: &UserScheduleKey,
    ) -> Result<BoardChange, GridError> {
        self.edit_user_schedule(key, |entry| entry.is_enabled = !entry.is_enabled)
    }

    fn edit_user_schedule(
        &mut self,
        key: &UserScheduleKey,
        edit: impl FnOnce(&mut crate::model::UserScheduleEntry),
    ) -> Result<BoardChange, GridError> {
        if !self.grid.has_user(&key.user_id) {
            return Err(GridError::UnknownUser(key.user_id.clone()));
        }
        let entry = self.grid.user_schedule_mut(key);
        edit(entry);
        let change = UserScheduleChange {
            key: key.clone(),
            entry: entry.clone(),
        };
        self.tracker.record_user_schedule(change.clone());
        Ok(BoardChange::UserScheduleChanged(change))
    }

    // Reload

    /// Replaces the grid with freshly loaded state.
    ///
    /// The tracker is reset, except that keys in `pending` keep their local
    /// values and stay tracked. Party order is local and is kept when the
    /// fresh grid carries the same parties.
    ///
    /// Pending cells win over the fresh state: a loaded occupant that would
    /// put a pending character in a second party of the same raid, or past
    /// the raid limit, is dropped. The returned changes describe those
    /// trimmed cells so they can be saved too.
    pub fn replace_grid(&mut self, fresh: GridState, pending: &PendingEdits) -> Vec<BoardChange> {
        let previous = std::mem::replace(&mut self.grid, fresh);

        let mut parties = previous.parties().to_vec();
        let mut fresh_parties = self.grid.parties().to_vec();
        parties.sort();
        fresh_parties.sort();
        if parties == fresh_parties {
            self.grid.set_parties(previous.parties().to_vec());
        }

        for key in &pending.cells {
            let finished = previous.finished().get(key).copied();
            self.grid
                .restore_cell(key, previous.cell(key).to_vec(), finished);
        }
        let trimmed = self.drop_loaded_conflicts(&pending.cells);
        self.tracker.reset();
        if !pending.cells.is_empty() {
            self.tracker.mark_schedule_changed();
        }
        self.carry_user_schedules(&previous, &pending.user_schedules);

        trimmed.iter().map(|key| self.cell_changed(key)).collect()
    }

    /// Removes occupants of non-pending cells that clash with a pending cell.
    fn drop_loaded_conflicts(&mut self, pending: &BTreeSet<CellKey>) -> BTreeSet<CellKey> {
        let mut trimmed = BTreeSet::new();

        for key in pending {
            let names: Vec<String> = self.grid.cell(key).iter().map(|c| c.name.clone()).collect();
            for name in names {
                let other_parties: Vec<CellKey> = self
                    .loaded_cells_with(&name, pending)
                    .into_iter()
                    .filter(|other| other.raid == key.raid && other.party != key.party)
                    .collect();
                for other in other_parties {
                    self.remove_named(&other, &name);
                    trimmed.insert(other);
                }

                while self.grid.character_raids(&name).len() > MAX_RAIDS_PER_CHARACTER {
                    let Some(other) = self.loaded_cells_with(&name, pending).into_iter().next()
                    else {
                        break;
                    };
                    self.remove_named(&other, &name);
                    trimmed.insert(other);
                }
            }
        }

        if !trimmed.is_empty() {
            debug!(cells = trimmed.len(), "dropped loaded placements clashing with pending edits");
        }
        trimmed
    }

    /// Non-pending cells holding `name`.
    fn loaded_cells_with(&self, name: &str, pending: &BTreeSet<CellKey>) -> Vec<CellKey> {
        self.grid
            .cells()
            .iter()
            .filter(|(key, occupants)| {
                !pending.contains(*key) && occupants.iter().any(|c| c.name == name)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn remove_named(&mut self, key: &CellKey, name: &str) {
        if let Some(index) = self.grid.cell(key).iter().position(|c| c.name == name) {
            self.grid.remove_at(key, index);
        }
    }

    /// Replaces only the raid list, e.g. after the backend assigned `seq` values.
    pub fn replace_raids(&mut self, raids: Vec<Raid>) {
        self.grid.set_raids(raids);
    }

    /// Replaces only the user schedules, keeping the local values of `pending` keys.
    pub fn replace_user_schedules(
        &mut self,
        schedules: UserScheduleMap,
        pending: &BTreeSet<UserScheduleKey>,
    ) {
        let previous = self.grid.clone();
        self.grid.set_user_schedules(schedules);
        let stale: Vec<UserScheduleChange> = self
            .tracker
            .changed_user_schedules()
            .iter()
            .filter(|c| !pending.contains(&c.key))
            .cloned()
            .collect();
        self.tracker.acknowledge_user_schedules(&stale);
        self.carry_user_schedules(&previous, pending);
    }

    fn carry_user_schedules(&mut self, previous: &GridState, pending: &BTreeSet<UserScheduleKey>) {
        for key in pending {
            if let Some(entry) = previous.user_schedule(key) {
                *self.grid.user_schedule_mut(key) = entry.clone();
                self.tracker.record_user_schedule(UserScheduleChange {
                    key: key.clone(),
                    entry: entry.clone(),
                });
            }
        }
    }

    fn cell_changed(&self, key: &CellKey) -> BoardChange {
        BoardChange::CellChanged {
            key: key.clone(),
            occupants: self.grid.cell(key).to_vec(),
            finished: self.grid.is_finished(key),
        }
    }
}

fn seq_for(index: usize) -> i32 {
    i32::try_from(index + 1).unwrap_or(i32::MAX)
}

fn unknown_character(user_id: &str, name: &str) -> GridError {
    GridError::UnknownCharacter {
        user_id: user_id.to_string(),
        name: name.to_string(),
    }
}
