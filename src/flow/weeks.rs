use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// ISO-8601 week, Monday-aligned, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeeklyBucket {
    pub iso_year: i32,
    pub iso_week: u32,
}

impl WeeklyBucket {
    pub fn of(at: DateTime<Utc>) -> Self {
        let week = at.iso_week();
        Self {
            iso_year: week.year(),
            iso_week: week.week(),
        }
    }

    pub fn from_monday(monday: NaiveDate) -> Self {
        let week = monday.iso_week();
        Self {
            iso_year: week.year(),
            iso_week: week.week(),
        }
    }
}

/// Monday of the week containing `at`.
pub fn monday_of(at: DateTime<Utc>) -> NaiveDate {
    let date = at.date_naive();
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Last instant of the week starting at `monday` (Sunday 23:59:59 UTC).
pub fn week_cutoff(monday: NaiveDate) -> DateTime<Utc> {
    let sunday = monday + Duration::days(6);
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&sunday.and_time(end_of_day))
}

/// Every Monday from `first` through `last`, inclusive.
pub fn mondays_between(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let first = first - Duration::days(i64::from(first.weekday().num_days_from_monday()));
    std::iter::successors(Some(first), |d| Some(*d + Duration::weeks(1)))
        .take_while(move |d| *d <= last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn iso_week_crosses_calendar_year() {
        // 2024-12-30 is a Monday in ISO week 1 of 2025
        let bucket = WeeklyBucket::of(at("2024-12-31T10:00:00Z"));
        assert_eq!(
            bucket,
            WeeklyBucket {
                iso_year: 2025,
                iso_week: 1
            }
        );
    }

    #[test]
    fn monday_of_sunday_is_six_days_back() {
        let monday = monday_of(at("2025-01-12T23:00:00Z"));
        assert_eq!(monday, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    }

    #[test]
    fn cutoff_is_end_of_sunday() {
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(week_cutoff(monday), at("2025-01-12T23:59:59Z"));
    }

    #[test]
    fn mondays_between_is_inclusive_and_contiguous() {
        let first = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let last = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
        let mondays: Vec<_> = mondays_between(first, last).collect();
        assert_eq!(mondays.len(), 4);
        assert_eq!(mondays[0], NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(mondays[3], NaiveDate::from_ymd_opt(2025, 1, 27).unwrap());
    }
}
