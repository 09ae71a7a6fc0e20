//! Two-week window with a Wednesday reset.

use std::fmt;

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::Serialize;

use crate::model::WeekNumber;

/// Day keys of user-schedule entries, in reset order.
pub const DAYS: [&str; 7] = [
    "WEDNESDAY",
    "THURSDAY",
    "FRIDAY",
    "SATURDAY",
    "SUNDAY",
    "MONDAY",
    "TUESDAY",
];

/// Normalises a day name (`fri`, `Friday`) to its key.
pub fn day_key(name: &str) -> Option<&'static str> {
    let name = name.trim().to_ascii_uppercase();
    if name.len() < 3 {
        return None;
    }
    DAYS.into_iter().find(|day| day.starts_with(&name))
}

/// Inclusive date range of one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for WeekRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}~{}/{}",
            self.start.month(),
            self.start.day(),
            self.end.month(),
            self.end.day()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekInfo {
    pub week1: WeekRange,
    pub week2: WeekRange,
}

impl WeekInfo {
    /// Week 1 starts on the most recent Wednesday (`date` included).
    pub fn for_date(date: NaiveDate) -> Self {
        let since_wednesday = (date.weekday().num_days_from_sunday() + 4) % 7;
        let start = date - Days::new(u64::from(since_wednesday));
        let week1 = WeekRange {
            start,
            end: start + Days::new(6),
        };
        let week2 = WeekRange {
            start: start + Days::new(7),
            end: start + Days::new(13),
        };
        Self { week1, week2 }
    }

    pub fn current() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn range(&self, week: WeekNumber) -> WeekRange {
        match week {
            WeekNumber::First => self.week1,
            WeekNumber::Second => self.week2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_wednesday_starts_week() {
        // 2026-10-14 is a Wednesday.
        let info = WeekInfo::for_date(date(2026, 10, 14));
        assert_eq!(info.week1.start, date(2026, 10, 14));
        assert_eq!(info.week1.end, date(2026, 10, 20));
        assert_eq!(info.week2.start, date(2026, 10, 21));
    }

    #[test]
    fn test_tuesday_belongs_to_previous_wednesday() {
        let info = WeekInfo::for_date(date(2026, 10, 20));
        assert_eq!(info.week1.start, date(2026, 10, 14));
    }

    #[test]
    fn test_day_key() {
        assert_eq!(day_key("fri"), Some("FRIDAY"));
        assert_eq!(day_key(" Wednesday "), Some("WEDNESDAY"));
        assert_eq!(day_key("t"), None);
        assert_eq!(day_key("funday"), None);
    }

    #[test]
    fn test_range_display_crosses_month() {
        let info = WeekInfo::for_date(date(2026, 10, 30));
        assert_eq!(info.week1.to_string(), "10/28~11/3");
        assert_eq!(info.range(WeekNumber::Second).to_string(), "11/4~11/10");
    }
}
