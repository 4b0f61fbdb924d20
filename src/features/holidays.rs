//! US federal holiday calendar (observed dates).
//!
//! Fixed-date holidays falling on a weekend are observed on the nearest
//! workday: Saturday moves to Friday, Sunday moves to Monday.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Observed federal holidays in `[start, end]` (inclusive).
///
/// Bounds are whole dates, so a holiday on the first day counts even when the
/// series itself starts after midnight.
pub fn federal_holidays(start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
    if end < start {
        return BTreeSet::new();
    }
    // One extra year each side: Jan 1 of year Y+1 can be observed on Dec 31 of Y.
    (start.year() - 1..=end.year() + 1)
        .flat_map(holidays_in_year)
        .filter(|d| *d >= start && *d <= end)
        .collect()
}

/// All observed federal holidays generated from the rules of `year`.
pub fn holidays_in_year(year: i32) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(11);

    let mut fixed = |month: u32, day: u32| {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            out.push(nearest_workday(d));
        }
    };
    fixed(1, 1); // New Year's Day
    fixed(7, 4); // Independence Day
    fixed(11, 11); // Veterans Day
    fixed(12, 25); // Christmas Day
    if year >= 2021 {
        fixed(6, 19); // Juneteenth
    }

    if year >= 1986 {
        out.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // Martin Luther King Jr. Day
    }
    out.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // Presidents Day
    out.extend(last_weekday(year, 5, Weekday::Mon)); // Memorial Day
    out.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // Labor Day
    out.extend(nth_weekday(year, 10, Weekday::Mon, 2)); // Columbus Day
    out.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // Thanksgiving

    out.sort();
    out
}

fn nearest_workday(d: NaiveDate) -> NaiveDate {
    match d.weekday() {
        Weekday::Sat => d - Duration::days(1),
        Weekday::Sun => d + Duration::days(1),
        _ => d,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn floating_holidays_2018() {
        let h = holidays_in_year(2018);
        assert!(h.contains(&d(2018, 1, 15))); // MLK
        assert!(h.contains(&d(2018, 2, 19))); // Presidents
        assert!(h.contains(&d(2018, 5, 28))); // Memorial
        assert!(h.contains(&d(2018, 9, 3))); // Labor
        assert!(h.contains(&d(2018, 10, 8))); // Columbus
        assert!(h.contains(&d(2018, 11, 22))); // Thanksgiving
        assert_eq!(h.len(), 10);
    }

    #[test]
    fn weekend_fixed_dates_use_nearest_workday() {
        // 2015-07-04 was a Saturday, 2016-12-25 a Sunday.
        assert!(holidays_in_year(2015).contains(&d(2015, 7, 3)));
        assert!(holidays_in_year(2016).contains(&d(2016, 12, 26)));
        // 2022-01-01 was a Saturday: observed on 2021-12-31.
        let range = federal_holidays(d(2021, 12, 1), d(2021, 12, 31));
        assert!(range.contains(&d(2021, 12, 31)));
    }

    #[test]
    fn juneteenth_only_from_2021() {
        assert!(holidays_in_year(2021).contains(&d(2021, 6, 18)));
        assert!(!holidays_in_year(2020).iter().any(|h| h.month() == 6));
    }

    #[test]
    fn range_is_inclusive_and_filtered() {
        let h = federal_holidays(d(2018, 1, 1), d(2018, 1, 15));
        assert_eq!(h.into_iter().collect::<Vec<_>>(), vec![d(2018, 1, 1), d(2018, 1, 15)]);
        assert!(federal_holidays(d(2018, 2, 1), d(2018, 1, 1)).is_empty());
    }
}
