//! Push-channel event vocabulary.
//!
//! The backend names every event `{entity}-{action}`, plus a handful of
//! control events. Names outside this vocabulary are ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::sse::SseFrame;

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event names as constants.
pub mod event_types {
    // Control
    pub const CONNECTED: &str = "connected";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const WEEK_ADVANCED: &str = "week-advanced";

    // Raid
    pub const RAID_CREATED: &str = "raid-created";
    pub const RAID_UPDATED: &str = "raid-updated";
    pub const RAID_DELETED: &str = "raid-deleted";
    pub const RAID_BATCH_SAVED: &str = "raid-batch-saved";

    // Character
    pub const CHARACTER_CREATED: &str = "character-created";
    pub const CHARACTER_UPDATED: &str = "character-updated";
    pub const CHARACTER_DELETED: &str = "character-deleted";
    pub const CHARACTER_BATCH_SAVED: &str = "character-batch-saved";

    // Schedule
    pub const SCHEDULE_CREATED: &str = "schedule-created";
    pub const SCHEDULE_UPDATED: &str = "schedule-updated";
    pub const SCHEDULE_DELETED: &str = "schedule-deleted";
    pub const SCHEDULE_BATCH_SAVED: &str = "schedule-batch-saved";

    // User
    pub const USER_CREATED: &str = "user-created";
    pub const USER_UPDATED: &str = "user-updated";
    pub const USER_DELETED: &str = "user-deleted";
    pub const USER_BATCH_SAVED: &str = "user-batch-saved";

    // User schedule
    pub const USER_SCHEDULE_CREATED: &str = "user-schedule-created";
    pub const USER_SCHEDULE_UPDATED: &str = "user-schedule-updated";
    pub const USER_SCHEDULE_DELETED: &str = "user-schedule-deleted";
    pub const USER_SCHEDULE_BATCH_SAVED: &str = "user-schedule-batch-saved";
}

// =============================================================================
// Entity and Action
// =============================================================================

/// Entity class named by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Raid,
    Character,
    Schedule,
    User,
    UserSchedule,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Raid,
        EntityKind::Character,
        EntityKind::Schedule,
        EntityKind::User,
        EntityKind::UserSchedule,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Raid => "raid",
            EntityKind::Character => "character",
            EntityKind::Schedule => "schedule",
            EntityKind::User => "user",
            EntityKind::UserSchedule => "user-schedule",
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    BatchSaved,
}

impl ChangeAction {
    pub const ALL: [ChangeAction; 4] = [
        ChangeAction::Created,
        ChangeAction::Updated,
        ChangeAction::Deleted,
        ChangeAction::BatchSaved,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
            ChangeAction::BatchSaved => "batch-saved",
        }
    }
}

/// A parsed `{entity}-{action}` event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeName {
    pub entity: EntityKind,
    pub action: ChangeAction,
}

impl fmt::Display for ChangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entity.as_str(), self.action.as_str())
    }
}

impl FromStr for ChangeName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Longest entity first so "user-schedule-…" is not read as "user-…".
        let mut entities = EntityKind::ALL;
        entities.sort_by_key(|e| std::cmp::Reverse(e.as_str().len()));

        for entity in entities {
            let Some(rest) = s
                .strip_prefix(entity.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
            else {
                continue;
            };
            if let Some(action) = ChangeAction::ALL.into_iter().find(|a| a.as_str() == rest) {
                return Ok(ChangeName { entity, action });
            }
        }
        Err(EventError::UnknownEvent(s.to_string()))
    }
}

// =============================================================================
// Sync Event
// =============================================================================

/// One event received over the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The server accepted the subscription.
    Connected,
    /// Keep-alive.
    Heartbeat,
    /// Server-side last-updated timestamp, unparsed.
    LastUpdated(String),
    /// An entity changed on the server. `data` is the raw payload.
    Changed { change: ChangeName, data: String },
    /// The user-schedule week was advanced.
    WeekAdvanced,
}

impl SyncEvent {
    /// Interprets a decoded frame.
    ///
    /// Returns `Ok(None)` for names outside the vocabulary.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, EventError> {
        let event = match frame.event_name() {
            event_types::CONNECTED => SyncEvent::Connected,
            event_types::HEARTBEAT => SyncEvent::Heartbeat,
            event_types::WEEK_ADVANCED => SyncEvent::WeekAdvanced,
            event_types::LAST_UPDATED => {
                let ts = frame.data.trim();
                if ts.is_empty() {
                    return Err(EventError::MalformedFrame(
                        "lastUpdated event without a timestamp".to_string(),
                    ));
                }
                SyncEvent::LastUpdated(ts.to_string())
            }
            name => match name.parse::<ChangeName>() {
                Ok(change) => SyncEvent::Changed {
                    change,
                    data: frame.data.clone(),
                },
                Err(_) => return Ok(None),
            },
        };
        Ok(Some(event))
    }

    /// Wire name of this event.
    pub fn name(&self) -> String {
        match self {
            SyncEvent::Connected => event_types::CONNECTED.to_string(),
            SyncEvent::Heartbeat => event_types::HEARTBEAT.to_string(),
            SyncEvent::LastUpdated(_) => event_types::LAST_UPDATED.to_string(),
            SyncEvent::WeekAdvanced => event_types::WEEK_ADVANCED.to_string(),
            SyncEvent::Changed { change, .. } => change.to_string(),
        }
    }

    /// JSON payload of a change event, if it has one.
    pub fn payload(&self) -> Result<Option<serde_json::Value>, EventError> {
        match self {
            SyncEvent::Changed { data, .. } if !data.trim().is_empty() => {
                Ok(Some(serde_json::from_str(data)?))
            }
            _ => Ok(None),
        }
    }

    /// Whether this event means server data changed and a reload is due.
    pub fn is_substantive(&self) -> bool {
        matches!(self, SyncEvent::Changed { .. } | SyncEvent::WeekAdvanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_change_name_parsing() {
        let name: ChangeName = "raid-batch-saved".parse().unwrap();
        assert_eq!(name.entity, EntityKind::Raid);
        assert_eq!(name.action, ChangeAction::BatchSaved);

        let name: ChangeName = event_types::USER_SCHEDULE_UPDATED.parse().unwrap();
        assert_eq!(name.entity, EntityKind::UserSchedule);
        assert_eq!(name.action, ChangeAction::Updated);
        assert_eq!(name.to_string(), "user-schedule-updated");

        let name: ChangeName = event_types::USER_DELETED.parse().unwrap();
        assert_eq!(name.entity, EntityKind::User);
    }

    #[test]
    fn test_change_name_rejects_unknown() {
        assert!("raid-exploded".parse::<ChangeName>().is_err());
        assert!("guild-created".parse::<ChangeName>().is_err());
        assert!("raid".parse::<ChangeName>().is_err());
    }

    #[test]
    fn test_from_frame_control_events() {
        assert_eq!(
            SyncEvent::from_frame(&frame("heartbeat", "")).unwrap(),
            Some(SyncEvent::Heartbeat)
        );
        assert_eq!(
            SyncEvent::from_frame(&frame("lastUpdated", "2026-10-17T12:00:00.123")).unwrap(),
            Some(SyncEvent::LastUpdated("2026-10-17T12:00:00.123".into()))
        );
        assert!(SyncEvent::from_frame(&frame("lastUpdated", " ")).is_err());
    }

    #[test]
    fn test_from_frame_unknown_is_ignored() {
        assert_eq!(SyncEvent::from_frame(&frame("mystery", "x")).unwrap(), None);
        let unnamed = SseFrame {
            event: None,
            data: "hello".into(),
            id: None,
        };
        assert_eq!(SyncEvent::from_frame(&unnamed).unwrap(), None);
    }

    #[test]
    fn test_substantive_events() {
        let changed = SyncEvent::from_frame(&frame("schedule-batch-saved", "{}"))
            .unwrap()
            .unwrap();
        assert!(changed.is_substantive());
        assert_eq!(changed.name(), "schedule-batch-saved");
        assert!(SyncEvent::WeekAdvanced.is_substantive());
        assert!(!SyncEvent::Heartbeat.is_substantive());
        assert!(!SyncEvent::LastUpdated("x".into()).is_substantive());
        assert!(!SyncEvent::Connected.is_substantive());
    }

    #[test]
    fn test_payload() {
        let changed = SyncEvent::from_frame(&frame("raid-created", r#"{"name":"R1","seq":3}"#))
            .unwrap()
            .unwrap();
        let payload = changed.payload().unwrap().unwrap();
        assert_eq!(payload["seq"], 3);

        let broken = SyncEvent::from_frame(&frame("raid-created", "{"))
            .unwrap()
            .unwrap();
        assert!(matches!(broken.payload(), Err(EventError::Data(_))));
        assert_eq!(SyncEvent::Heartbeat.payload().unwrap(), None);
    }

    #[test]
    fn test_entity_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&EntityKind::UserSchedule).unwrap(),
            "\"user-schedule\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeAction::BatchSaved).unwrap(),
            "\"batch-saved\""
        );
    }
}
