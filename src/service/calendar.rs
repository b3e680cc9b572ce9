//! Date arithmetic for ages, countdowns and upcoming windows.
//!
//! Everything here is pure: callers pass "today" explicitly so the scheduler,
//! handlers and tests all agree on the reference date.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::error::AppError;
use crate::types::Birthday;

/// Strict `YYYY-MM-DD`.
pub fn parse_birthdate(raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    // chrono accepts unpadded fields; the stored format does not.
    let shaped = raw.len() == 10 && raw.as_bytes()[4] == b'-' && raw.as_bytes()[7] == b'-';
    if !shaped {
        return Err(invalid_date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid_date())
}

fn invalid_date() -> AppError {
    AppError::validation("Invalid date format. Use YYYY-MM-DD")
}

/// Completed years on `today`. Clamped at zero for future birthdates.
pub fn age_on(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        age -= 1;
    }
    age.max(0)
}

/// The birthday as observed in `year`. Feb 29 falls back to Feb 28.
fn occurrence_in(birthdate: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birthdate.month(), birthdate.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(birthdate)
}

/// First observed birthday on or after `today`.
pub fn next_occurrence(birthdate: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = occurrence_in(birthdate, today.year());
    if this_year >= today {
        this_year
    } else {
        occurrence_in(birthdate, today.year() + 1)
    }
}

/// Whole days until the next birthday; 0 on the day itself, never above 365.
pub fn days_until(birthdate: NaiveDate, today: NaiveDate) -> u32 {
    let days = (next_occurrence(birthdate, today) - today).num_days();
    u32::try_from(days.clamp(0, 365)).unwrap_or(0)
}

pub fn is_birthday_on(birthdate: NaiveDate, today: NaiveDate) -> bool {
    occurrence_in(birthdate, today.year()) == today
}

/// `MM-DD` keys whose stored birthdates are observed on `today`.
pub fn month_day_keys(today: NaiveDate) -> Vec<String> {
    let mut keys = vec![today.format("%m-%d").to_string()];
    let leap = NaiveDate::from_ymd_opt(today.year(), 2, 29).is_some();
    if !leap && today.month() == 2 && today.day() == 28 {
        keys.push("02-29".to_string());
    }
    keys
}

/// A birthday inside an upcoming window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upcoming {
    #[serde(flatten)]
    pub birthday: Birthday,
    pub days_until: u32,
    pub target_date: NaiveDate,
    /// Age reached on `target_date`.
    pub turning: i32,
    pub weekday: &'static str,
}

/// Records whose next birthday falls within `[today, today + days]`,
/// ordered by countdown then name.
pub fn upcoming<'a, I>(records: I, today: NaiveDate, days: u32) -> Vec<Upcoming>
where
    I: IntoIterator<Item = &'a Birthday>,
{
    let end = today + Duration::days(i64::from(days));
    let mut out: Vec<Upcoming> = records
        .into_iter()
        .filter_map(|b| {
            let target = next_occurrence(b.birthdate, today);
            (target <= end).then(|| Upcoming {
                birthday: b.clone(),
                days_until: days_until(b.birthdate, today),
                target_date: target,
                turning: age_on(b.birthdate, target),
                weekday: weekday_name(target.weekday()),
            })
        })
        .collect();
    out.sort_by(|a, b| {
        a.days_until
            .cmp(&b.days_until)
            .then_with(|| a.birthday.name.cmp(&b.birthday.name))
    });
    out
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Upcoming birthdays bucketed by the weekday they fall on.
/// Serializes as an object keyed `Monday`..`Sunday`, in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeekdayGroups {
    pub monday: Vec<Upcoming>,
    pub tuesday: Vec<Upcoming>,
    pub wednesday: Vec<Upcoming>,
    pub thursday: Vec<Upcoming>,
    pub friday: Vec<Upcoming>,
    pub saturday: Vec<Upcoming>,
    pub sunday: Vec<Upcoming>,
}

impl WeekdayGroups {
    fn bucket_mut(&mut self, day: Weekday) -> &mut Vec<Upcoming> {
        match day {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }

    pub fn len(&self) -> usize {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
        .iter()
        .map(|v| v.len())
        .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input order is preserved within a bucket, so pass a sorted `upcoming` list.
pub fn group_by_weekday(items: Vec<Upcoming>) -> WeekdayGroups {
    let mut groups = WeekdayGroups::default();
    for item in items {
        groups.bucket_mut(item.target_date.weekday()).push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(id: i64, name: &str, birthdate: NaiveDate) -> Birthday {
        Birthday {
            id,
            name: name.to_string(),
            birthdate,
            photo: None,
            gender: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn parse_is_strict() {
        assert_eq!(parse_birthdate(" 1990-01-15 ").unwrap(), d(1990, 1, 15));
        assert!(parse_birthdate("1990-1-15").is_err());
        assert!(parse_birthdate("15.01.1990").is_err());
        assert!(parse_birthdate("1990-02-30").is_err());
        assert!(parse_birthdate("").is_err());
    }

    #[test]
    fn age_uses_month_and_day() {
        let birth = d(1990, 6, 15);
        assert_eq!(age_on(birth, d(2024, 6, 14)), 33);
        assert_eq!(age_on(birth, d(2024, 6, 15)), 34);
        assert_eq!(age_on(birth, d(2024, 12, 31)), 34);
        assert_eq!(age_on(d(2030, 1, 1), d(2024, 1, 1)), 0);
    }

    #[test]
    fn days_until_wraps_the_year() {
        let today = d(2024, 12, 30);
        assert_eq!(days_until(d(1990, 12, 30), today), 0);
        assert_eq!(days_until(d(1990, 12, 31), today), 1);
        assert_eq!(days_until(d(1990, 1, 2), today), 3);
        // yesterday's birthday is a full year away
        assert_eq!(days_until(d(1990, 12, 29), today), 364);
        assert_eq!(days_until(d(1990, 12, 29), d(2023, 12, 30)), 365);
    }

    #[test]
    fn days_until_stays_in_range() {
        let birth = d(1984, 2, 29);
        let mut today = d(2023, 1, 1);
        while today < d(2026, 1, 1) {
            assert!(days_until(birth, today) <= 365);
            assert!(days_until(d(1990, 7, 4), today) <= 365);
            today = today.succ_opt().unwrap();
        }
    }

    #[test]
    fn leap_day_birthdays() {
        let birth = d(2000, 2, 29);
        assert_eq!(next_occurrence(birth, d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(next_occurrence(birth, d(2024, 2, 1)), d(2024, 2, 29));
        assert!(is_birthday_on(birth, d(2023, 2, 28)));
        assert!(!is_birthday_on(birth, d(2024, 2, 28)));
        assert_eq!(month_day_keys(d(2023, 2, 28)), vec!["02-28", "02-29"]);
        assert_eq!(month_day_keys(d(2024, 2, 28)), vec!["02-28"]);
    }

    #[test]
    fn upcoming_window_is_inclusive_and_sorted() {
        let today = d(2024, 3, 1);
        let records = vec![
            record(1, "Zed", d(1990, 3, 5)),
            record(2, "Amy", d(1990, 3, 5)),
            record(3, "Bob", d(1980, 3, 1)),
            record(4, "Out", d(1980, 3, 9)),
            record(5, "Edge", d(1980, 3, 8)),
        ];
        let items = upcoming(&records, today, 7);
        let names: Vec<_> = items.iter().map(|u| u.birthday.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Amy", "Zed", "Edge"]);
        assert_eq!(items[0].days_until, 0);
        assert_eq!(items[0].turning, 44);
        assert_eq!(items[1].target_date, d(2024, 3, 5));
        assert_eq!(items[1].weekday, "Tuesday");
    }

    #[test]
    fn groups_serialize_in_weekday_order() {
        let today = d(2024, 3, 4); // Monday
        let records = vec![record(1, "Sun", d(1990, 3, 10)), record(2, "Mon", d(1990, 3, 4))];
        let groups = group_by_weekday(upcoming(&records, today, 30));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.monday[0].birthday.name, "Mon");
        assert_eq!(groups.sunday[0].birthday.name, "Sun");

        let json = serde_json::to_string(&groups).unwrap();
        let mon = json.find("\"Monday\"").unwrap();
        let sun = json.find("\"Sunday\"").unwrap();
        assert!(mon < sun);
    }
}
