//! Board data model.
//!
//! These are the local, typed shapes. Wire encodings (Y/N flags, flat schedule
//! records) live with the backend client.

use std::fmt;

use raidboard_id::ScheduleId;
use serde::{Deserialize, Serialize};

/// A character owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Unique within the owning user.
    pub name: String,
    pub is_supporter: bool,
    pub user_id: String,
    /// Display/priority order among the user's characters.
    pub seq: i32,
}

impl Character {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, seq: i32) -> Self {
        Self {
            name: name.into(),
            is_supporter: false,
            user_id: user_id.into(),
            seq,
        }
    }

    #[must_use]
    pub fn supporter(mut self) -> Self {
        self.is_supporter = true;
        self
    }
}

/// A raid column. `seq` defines column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raid {
    pub name: String,
    pub seq: i32,
}

impl Raid {
    pub fn new(name: impl Into<String>, seq: i32) -> Self {
        Self {
            name: name.into(),
            seq,
        }
    }
}

/// A board user and the color their characters are drawn with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub color: String,
}

impl User {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Address of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub party: String,
    pub raid: String,
}

impl CellKey {
    pub fn new(party: impl Into<String>, raid: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            raid: raid.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.party, self.raid)
    }
}

/// A character placed into a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedCharacter {
    pub name: String,
    pub user_id: String,
    pub is_supporter: bool,
    pub raid_name: String,
    pub party_name: String,
    pub schedule_id: ScheduleId,
}

impl AssignedCharacter {
    /// Places `character` at `key` under a fresh schedule id.
    pub fn new(character: &Character, key: &CellKey) -> Self {
        Self {
            name: character.name.clone(),
            user_id: character.user_id.clone(),
            is_supporter: character.is_supporter,
            raid_name: key.raid.clone(),
            party_name: key.party.clone(),
            schedule_id: ScheduleId::new(),
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(self.party_name.clone(), self.raid_name.clone())
    }
}

/// Which of the two tracked weeks an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WeekNumber {
    First,
    Second,
}

impl WeekNumber {
    pub const fn number(self) -> u8 {
        match self {
            WeekNumber::First => 1,
            WeekNumber::Second => 2,
        }
    }
}

impl TryFrom<u8> for WeekNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WeekNumber::First),
            2 => Ok(WeekNumber::Second),
            other => Err(format!("week number must be 1 or 2, got {other}")),
        }
    }
}

impl From<WeekNumber> for u8 {
    fn from(week: WeekNumber) -> Self {
        week.number()
    }
}

impl fmt::Display for WeekNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "week{}", self.number())
    }
}

/// Address of one user-schedule entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScheduleKey {
    pub user_id: String,
    pub week: WeekNumber,
    pub day: String,
}

impl UserScheduleKey {
    pub fn new(user_id: impl Into<String>, week: WeekNumber, day: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            week,
            day: day.into(),
        }
    }
}

impl fmt::Display for UserScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.user_id, self.day, self.week)
    }
}

/// Free-text availability note for one user on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScheduleEntry {
    pub text: String,
    pub is_enabled: bool,
}

impl Default for UserScheduleEntry {
    fn default() -> Self {
        Self {
            text: String::new(),
            is_enabled: true,
        }
    }
}

/// A user-schedule entry together with its key, as queued for saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScheduleChange {
    pub key: UserScheduleKey,
    pub entry: UserScheduleEntry,
}

/// One `{name, seq}` pair of a raid reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidOrder {
    pub name: String,
    pub seq: i32,
}

impl From<&Raid> for RaidOrder {
    fn from(raid: &Raid) -> Self {
        Self {
            name: raid.name.clone(),
            seq: raid.seq,
        }
    }
}
