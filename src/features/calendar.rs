//! Calendar features derived from a timestamp.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::domain::Season;

/// Calendar breakdown of one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    /// 0-23
    pub hour: u32,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    /// 1-4
    pub quarter: u32,
    /// 1-12
    pub month: u32,
    pub year: i32,
    /// 1-based
    pub day_of_year: u32,
    pub season: Season,
}

impl CalendarFeatures {
    pub fn from_timestamp(ts: NaiveDateTime) -> Self {
        let month = ts.month();
        Self {
            hour: ts.hour(),
            day_of_week: ts.weekday().num_days_from_monday(),
            quarter: (month - 1) / 3 + 1,
            month,
            year: ts.year(),
            day_of_year: ts.ordinal(),
            season: Season::from_month(month),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn calendar_fields_for_known_timestamp() {
        // 2016-12-31 23:00 was a Saturday in a leap year.
        let ts = NaiveDate::from_ymd_opt(2016, 12, 31)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let c = CalendarFeatures::from_timestamp(ts);
        assert_eq!(c.hour, 23);
        assert_eq!(c.day_of_week, 5);
        assert_eq!(c.quarter, 4);
        assert_eq!(c.month, 12);
        assert_eq!(c.year, 2016);
        assert_eq!(c.day_of_year, 366);
        assert_eq!(c.season, Season::Winter);
    }

    #[test]
    fn quarters_cover_months() {
        for (month, quarter) in [(1, 1), (3, 1), (4, 2), (6, 2), (7, 3), (9, 3), (10, 4), (12, 4)] {
            let ts = NaiveDate::from_ymd_opt(2020, month, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            assert_eq!(CalendarFeatures::from_timestamp(ts).quarter, quarter);
        }
    }
}
