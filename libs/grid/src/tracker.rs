//! Change Tracker: what differs locally from the last synced baseline.
//!
//! Each entity class is tracked independently. Persistence acknowledges
//! exactly what it saved, so edits made while a save was running stay
//! tracked.

use std::collections::BTreeSet;

use crate::model::{Character, Raid, RaidOrder, UserScheduleChange};

/// What happened to a deleted entity in the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDisposition {
    /// The entity was never saved; it was dropped from the pending-create list.
    DroppedUnsaved,
    /// The entity exists on the backend; a delete is queued.
    Queued,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeTracker {
    new_characters: Vec<Character>,
    deleted_characters: Vec<String>,
    updated_users: BTreeSet<String>,
    raid_order: Vec<RaidOrder>,
    new_raids: Vec<Raid>,
    deleted_raids: Vec<String>,
    schedule_generation: u64,
    saved_schedule_generation: u64,
    changed_user_schedules: Vec<UserScheduleChange>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_characters(&self) -> &[Character] {
        &self.new_characters
    }

    pub fn deleted_characters(&self) -> &[String] {
        &self.deleted_characters
    }

    /// Users whose characters were reordered or had the supporter flag toggled.
    pub fn updated_users(&self) -> &BTreeSet<String> {
        &self.updated_users
    }

    /// Pending full raid order; empty when the order is unchanged.
    pub fn raid_order(&self) -> &[RaidOrder] {
        &self.raid_order
    }

    pub fn raid_order_changed(&self) -> bool {
        !self.raid_order.is_empty()
    }

    pub fn new_raids(&self) -> &[Raid] {
        &self.new_raids
    }

    pub fn deleted_raids(&self) -> &[String] {
        &self.deleted_raids
    }

    pub fn schedule_changed(&self) -> bool {
        self.schedule_generation != self.saved_schedule_generation
    }

    /// Counter bumped by every cell or finish-flag edit.
    pub fn schedule_generation(&self) -> u64 {
        self.schedule_generation
    }

    /// Highest generation known to be on the server.
    pub fn saved_schedule_generation(&self) -> u64 {
        self.saved_schedule_generation
    }

    pub fn changed_user_schedules(&self) -> &[UserScheduleChange] {
        &self.changed_user_schedules
    }

    pub fn record_character_created(&mut self, character: Character) {
        self.deleted_characters.retain(|n| *n != character.name);
        self.new_characters.push(character);
    }

    pub fn record_character_deleted(&mut self, user_id: &str, name: &str) -> DeleteDisposition {
        let before = self.new_characters.len();
        self.new_characters
            .retain(|c| !(c.user_id == user_id && c.name == name));
        if self.new_characters.len() != before {
            return DeleteDisposition::DroppedUnsaved;
        }
        if !self.deleted_characters.iter().any(|n| n == name) {
            self.deleted_characters.push(name.to_string());
        }
        DeleteDisposition::Queued
    }

    pub fn record_user_updated(&mut self, user_id: &str) {
        self.updated_users.insert(user_id.to_string());
    }

    pub fn record_raid_order(&mut self, order: Vec<RaidOrder>) {
        self.raid_order = order;
    }

    pub fn record_raid_added(&mut self, raid: Raid) {
        self.deleted_raids.retain(|n| *n != raid.name);
        self.new_raids.push(raid);
    }

    pub fn record_raid_deleted(&mut self, name: &str) -> DeleteDisposition {
        let before = self.new_raids.len();
        self.new_raids.retain(|r| r.name != name);
        self.raid_order.retain(|o| o.name != name);
        if self.new_raids.len() != before {
            return DeleteDisposition::DroppedUnsaved;
        }
        if !self.deleted_raids.iter().any(|n| n == name) {
            self.deleted_raids.push(name.to_string());
        }
        DeleteDisposition::Queued
    }

    pub fn mark_schedule_changed(&mut self) {
        self.schedule_generation += 1;
    }

    /// Records a user-schedule edit. A later edit to the same key overwrites
    /// the queued one in place.
    pub fn record_user_schedule(&mut self, change: UserScheduleChange) {
        match self
            .changed_user_schedules
            .iter_mut()
            .find(|c| c.key == change.key)
        {
            Some(existing) => existing.entry = change.entry,
            None => self.changed_user_schedules.push(change),
        }
    }

    pub fn acknowledge_characters_created(&mut self, saved: &[Character]) {
        self.new_characters.retain(|c| {
            !saved
                .iter()
                .any(|s| s.user_id == c.user_id && s.name == c.name)
        });
    }

    pub fn acknowledge_characters_deleted(&mut self, names: &[String]) {
        self.deleted_characters.retain(|n| !names.contains(n));
    }

    pub fn acknowledge_users_updated(&mut self, users: &[String]) {
        self.updated_users.retain(|u| !users.contains(u));
    }

    /// Clears the pending order if it is still the one that was saved.
    pub fn acknowledge_raid_order(&mut self, saved: &[RaidOrder]) {
        if self.raid_order == saved {
            self.raid_order.clear();
        }
    }

    pub fn acknowledge_raids_added(&mut self, names: &[String]) {
        self.new_raids.retain(|r| !names.contains(&r.name));
    }

    pub fn acknowledge_raids_deleted(&mut self, names: &[String]) {
        self.deleted_raids.retain(|n| !names.contains(n));
    }

    /// Marks schedule state up to `generation` as saved.
    pub fn acknowledge_schedule(&mut self, generation: u64) {
        self.saved_schedule_generation = self.saved_schedule_generation.max(generation);
    }

    /// Drops saved entries whose value has not changed since.
    pub fn acknowledge_user_schedules(&mut self, saved: &[UserScheduleChange]) {
        self.changed_user_schedules
            .retain(|c| !saved.iter().any(|s| s == c));
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    pub fn total_changes(&self) -> usize {
        self.new_characters.len()
            + self.deleted_characters.len()
            + self.updated_users.len()
            + self.raid_order.len()
            + self.new_raids.len()
            + self.deleted_raids.len()
            + usize::from(self.schedule_changed())
            + usize::from(!self.changed_user_schedules.is_empty())
    }

    /// Forgets everything; the current state becomes the baseline.
    pub fn reset(&mut self) {
        let generation = self.schedule_generation;
        *self = Self {
            schedule_generation: generation,
            saved_schedule_generation: generation,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{UserScheduleEntry, UserScheduleKey, WeekNumber};

    fn change(text: &str) -> UserScheduleChange {
        UserScheduleChange {
            key: UserScheduleKey::new("U1", WeekNumber::First, "수"),
            entry: UserScheduleEntry {
                text: text.into(),
                is_enabled: true,
            },
        }
    }

    #[test]
    fn test_delete_unsaved_character_is_dropped() {
        let mut tracker = ChangeTracker::new();
        tracker.record_character_created(Character::new("U1", "X", 1));

        let disposition = tracker.record_character_deleted("U1", "X");
        assert_eq!(disposition, DeleteDisposition::DroppedUnsaved);
        assert!(tracker.new_characters().is_empty());
        assert!(tracker.deleted_characters().is_empty());
        assert!(!tracker.has_changes());
    }

    #[test]
    fn test_delete_saved_character_is_queued_once() {
        let mut tracker = ChangeTracker::new();
        assert_eq!(tracker.record_character_deleted("U1", "X"), DeleteDisposition::Queued);
        assert_eq!(tracker.record_character_deleted("U1", "X"), DeleteDisposition::Queued);
        assert_eq!(tracker.deleted_characters(), ["X".to_string()]);
    }

    #[test]
    fn test_user_schedule_edits_overwrite_in_place() {
        let mut tracker = ChangeTracker::new();
        tracker.record_user_schedule(change("a"));
        tracker.record_user_schedule(change("b"));
        tracker.record_user_schedule(change("c"));
        assert_eq!(tracker.changed_user_schedules(), [change("c")]);
    }

    #[test]
    fn test_acknowledge_keeps_newer_user_schedule_value() {
        let mut tracker = ChangeTracker::new();
        tracker.record_user_schedule(change("a"));
        let saved = tracker.changed_user_schedules().to_vec();
        tracker.record_user_schedule(change("b"));

        tracker.acknowledge_user_schedules(&saved);
        assert_eq!(tracker.changed_user_schedules(), [change("b")]);

        tracker.acknowledge_user_schedules(&[change("b")]);
        assert!(tracker.changed_user_schedules().is_empty());
    }

    #[test]
    fn test_schedule_generation_survives_concurrent_edit() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_schedule_changed();
        let saving = tracker.schedule_generation();
        tracker.mark_schedule_changed();

        tracker.acknowledge_schedule(saving);
        assert!(tracker.schedule_changed());

        tracker.acknowledge_schedule(tracker.schedule_generation());
        assert!(!tracker.schedule_changed());
    }

    #[test]
    fn test_raid_delete_of_new_raid_is_dropped() {
        let mut tracker = ChangeTracker::new();
        tracker.record_raid_added(Raid::new("R9", 9));
        assert_eq!(tracker.record_raid_deleted("R9"), DeleteDisposition::DroppedUnsaved);
        assert_eq!(tracker.record_raid_deleted("R1"), DeleteDisposition::Queued);
        assert_eq!(tracker.deleted_raids(), ["R1".to_string()]);
    }

    #[test]
    fn test_total_changes_and_reset() {
        let mut tracker = ChangeTracker::new();
        tracker.record_character_created(Character::new("U1", "X", 1));
        tracker.record_user_updated("U2");
        tracker.mark_schedule_changed();
        tracker.record_user_schedule(change("a"));
        tracker.record_user_schedule(change("b"));
        assert_eq!(tracker.total_changes(), 4);

        tracker.reset();
        assert!(!tracker.has_changes());
        assert!(!tracker.schedule_changed());
    }
}
