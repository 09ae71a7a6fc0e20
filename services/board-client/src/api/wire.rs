//! Wire shapes of the REST API and conversions to board types.
//!
//! Boolean flags travel as `"Y"`/`"N"` strings. Older rows may carry real
//! booleans, so decoding accepts both.

use std::collections::BTreeMap;

use raidboard_grid::{
    AssignedCharacter, Character, Raid, RaidOrder, User, UserScheduleChange, UserScheduleEntry,
    UserScheduleKey, WeekNumber,
};
use raidboard_reconcile::ServerTimestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ScheduleRecord, ScheduleSnapshot};
use crate::error::ClientError;

/// A `Y`/`N` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YesNo(pub bool);

impl Serialize for YesNo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0 { "Y" } else { "N" })
    }
}

impl<'de> Deserialize<'de> for YesNo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(YesNo(b)),
            Raw::Text(s) => match s.trim() {
                "Y" | "y" | "true" => Ok(YesNo(true)),
                "N" | "n" | "false" | "" => Ok(YesNo(false)),
                other => Err(serde::de::Error::custom(format!(
                    "expected Y or N, got {other:?}"
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRaid {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i32>,
}

impl From<WireRaid> for Raid {
    fn from(raid: WireRaid) -> Self {
        Raid::new(raid.name, raid.seq.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRaidOrder {
    pub name: String,
    pub seq: i32,
}

impl From<&RaidOrder> for WireRaidOrder {
    fn from(order: &RaidOrder) -> Self {
        Self {
            name: order.name.clone(),
            seq: order.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCharacter {
    pub name: String,
    pub is_supporter: YesNo,
    pub user_id: String,
    #[serde(default)]
    pub seq: i32,
}

impl From<&Character> for WireCharacter {
    fn from(c: &Character) -> Self {
        Self {
            name: c.name.clone(),
            is_supporter: YesNo(c.is_supporter),
            user_id: c.user_id.clone(),
            seq: c.seq,
        }
    }
}

impl From<WireCharacter> for Character {
    fn from(c: WireCharacter) -> Self {
        Character {
            name: c.name,
            is_supporter: c.is_supporter.0,
            user_id: c.user_id,
            seq: c.seq,
        }
    }
}

/// One flat schedule row. `id` is the party label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSchedule {
    pub id: String,
    pub raid_name: String,
    pub character_name: String,
    #[serde(default)]
    pub is_finish: YesNo,
}

impl From<&ScheduleRecord> for WireSchedule {
    fn from(r: &ScheduleRecord) -> Self {
        Self {
            id: r.party.clone(),
            raid_name: r.raid.clone(),
            character_name: r.character_name.clone(),
            is_finish: YesNo(r.finished),
        }
    }
}

impl From<WireSchedule> for ScheduleRecord {
    fn from(r: WireSchedule) -> Self {
        ScheduleRecord {
            party: r.id,
            raid: r.raid_name,
            character_name: r.character_name,
            finished: r.is_finish.0,
        }
    }
}

/// Body of the schedule batch save. Keys are `party-raid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireScheduleBatch {
    pub schedules: BTreeMap<String, Vec<AssignedCharacter>>,
    pub schedule_finish: BTreeMap<String, bool>,
}

impl From<&ScheduleSnapshot> for WireScheduleBatch {
    fn from(snapshot: &ScheduleSnapshot) -> Self {
        Self {
            schedules: snapshot
                .cells
                .iter()
                .map(|(key, occupants)| (key.to_string(), occupants.clone()))
                .collect(),
            schedule_finish: snapshot
                .finished
                .iter()
                .map(|(key, flag)| (key.to_string(), *flag))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUser {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl From<&User> for WireUser {
    fn from(u: &User) -> Self {
        Self {
            name: u.name.clone(),
            color: Some(u.color.clone()),
        }
    }
}

impl From<WireUser> for User {
    fn from(u: WireUser) -> Self {
        User::new(u.name, u.color.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUserSchedule {
    pub user_id: String,
    pub day_of_week: String,
    #[serde(default = "first_week")]
    pub week_number: u8,
    #[serde(default)]
    pub schedule_text: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: YesNo,
}

fn first_week() -> u8 {
    1
}

fn enabled() -> YesNo {
    YesNo(true)
}

impl From<&UserScheduleChange> for WireUserSchedule {
    fn from(c: &UserScheduleChange) -> Self {
        Self {
            user_id: c.key.user_id.clone(),
            day_of_week: c.key.day.clone(),
            week_number: c.key.week.number(),
            schedule_text: Some(c.entry.text.clone()),
            enabled: YesNo(c.entry.is_enabled),
        }
    }
}

impl TryFrom<WireUserSchedule> for UserScheduleChange {
    type Error = ClientError;

    fn try_from(w: WireUserSchedule) -> Result<Self, Self::Error> {
        let week = WeekNumber::try_from(w.week_number).map_err(ClientError::Decode)?;
        Ok(UserScheduleChange {
            key: UserScheduleKey::new(w.user_id, week, w.day_of_week),
            entry: UserScheduleEntry {
                text: w.schedule_text.unwrap_or_default(),
                is_enabled: w.enabled.0,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLastUpdated {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub epoch_milli: Option<i64>,
}

/// Decodes a last-updated body: either `{timestamp, epochMilli}` or a bare
/// timestamp string.
pub fn parse_last_updated(body: &str) -> Result<ServerTimestamp, ClientError> {
    let body = body.trim();
    if body.starts_with('{') {
        let parsed: WireLastUpdated =
            serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        if let Some(millis) = parsed.epoch_milli {
            return Ok(ServerTimestamp::from_epoch_millis(millis)?);
        }
        if let Some(ts) = parsed.timestamp {
            return Ok(ServerTimestamp::parse(&ts)?);
        }
        return Err(ClientError::Decode(
            "last-updated response carries no timestamp".to_string(),
        ));
    }
    Ok(ServerTimestamp::parse(body)?)
}
