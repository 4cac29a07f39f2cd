// Calendar buckets for aggregate statistics
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::event_time::EventClock;

use super::domain::ToxicLevel;

/// Upper bound on buckets per request; a year of days plus slack.
pub const MAX_BUCKETS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            _ => Err(AppError::validation(
                "granularity",
                "granularity must be one of day, week, month",
            )),
        }
    }
}

/// One bucket: `label` is the aligned local start, `[start, end)` the part
/// of it inside the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsBucket {
    pub label: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRow {
    pub bucket: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toxic_level: Option<ToxicLevel>,
    pub purified_count: i64,
    pub unpurified_count: i64,
    pub total_vibes: i64,
}

/// Calendar arithmetic in the clock's zone.
#[derive(Debug, Clone, Copy)]
pub struct BucketCalendar {
    clock: EventClock,
    week_starts_on_sunday: bool,
}

impl BucketCalendar {
    pub fn new(clock: EventClock, week_starts_on_sunday: bool) -> Self {
        Self {
            clock,
            week_starts_on_sunday,
        }
    }

    /// First local date of the bucket containing `date`.
    fn align(&self, granularity: Granularity, date: NaiveDate) -> NaiveDate {
        match granularity {
            Granularity::Day => date,
            Granularity::Week => {
                let back = if self.week_starts_on_sunday {
                    date.weekday().num_days_from_sunday()
                } else {
                    date.weekday().num_days_from_monday()
                };
                date.checked_sub_days(Days::new(back as u64)).unwrap_or(date)
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next(&self, granularity: Granularity, start: NaiveDate) -> Option<NaiveDate> {
        match granularity {
            Granularity::Day => start.checked_add_days(Days::new(1)),
            Granularity::Week => start.checked_add_days(Days::new(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    /// The whole bucket containing `now`.
    pub fn current(&self, granularity: Granularity, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let first = self.align(granularity, self.clock.local_date(now));
        let start = self.clock.local_midnight(first);
        let end = self
            .next(granularity, first)
            .map(|d| self.clock.local_midnight(d))
            .unwrap_or(start);
        (start, end)
    }

    /// Buckets covering `[from, to)`, clipped to the range.
    pub fn buckets(
        &self,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<StatsBucket>> {
        if to <= from {
            return Err(AppError::validation("to", "to must be after from"));
        }

        let mut buckets = Vec::new();
        let mut day = self.align(granularity, self.clock.local_date(from));
        let mut label = self.clock.local_midnight(day);
        while label < to {
            if buckets.len() == MAX_BUCKETS {
                return Err(AppError::validation(
                    "to",
                    format!("range spans more than {MAX_BUCKETS} {granularity} buckets"),
                ));
            }
            let Some(next_day) = self.next(granularity, day) else {
                break;
            };
            let next_label = self.clock.local_midnight(next_day);
            buckets.push(StatsBucket {
                label,
                start: label.max(from),
                end: next_label.min(to),
            });
            day = next_day;
            label = next_label;
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn jst_calendar(sunday: bool) -> BucketCalendar {
        BucketCalendar::new(
            EventClock::new(FixedOffset::east_opt(9 * 3600).unwrap(), 0, 12),
            sunday,
        )
    }

    fn jst(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Week".parse::<Granularity>().unwrap(), Granularity::Week);
        assert!(matches!(
            "year".parse::<Granularity>(),
            Err(AppError::Validation { ref field, .. }) if field == "granularity"
        ));
    }

    #[test]
    fn current_day_and_month() {
        let cal = jst_calendar(false);
        // 2025-11-27 is a Thursday
        let now = jst(11, 27, 15);
        assert_eq!(cal.current(Granularity::Day, now), (jst(11, 27, 0), jst(11, 28, 0)));
        assert_eq!(cal.current(Granularity::Month, now), (jst(11, 1, 0), jst(12, 1, 0)));
    }

    #[test]
    fn week_start_follows_setting() {
        let now = jst(11, 27, 15);
        assert_eq!(
            jst_calendar(false).current(Granularity::Week, now),
            (jst(11, 24, 0), jst(12, 1, 0))
        );
        assert_eq!(
            jst_calendar(true).current(Granularity::Week, now),
            (jst(11, 23, 0), jst(11, 30, 0))
        );

        // A Sunday belongs to the previous Monday-week
        let sunday = jst(11, 30, 9);
        assert_eq!(
            jst_calendar(false).current(Granularity::Week, sunday).0,
            jst(11, 24, 0)
        );
    }

    #[test]
    fn buckets_are_clipped_to_the_range() {
        let cal = jst_calendar(false);
        let buckets = cal
            .buckets(Granularity::Day, jst(11, 26, 18), jst(11, 28, 6))
            .unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].label, jst(11, 26, 0));
        assert_eq!(buckets[0].start, jst(11, 26, 18));
        assert_eq!(buckets[0].end, jst(11, 27, 0));
        assert_eq!(buckets[1].start, jst(11, 27, 0));
        assert_eq!(buckets[2].end, jst(11, 28, 6));
    }

    #[test]
    fn empty_or_huge_ranges_are_rejected() {
        let cal = jst_calendar(false);
        assert!(cal.buckets(Granularity::Day, jst(11, 2, 0), jst(11, 2, 0)).is_err());
        assert!(cal.buckets(Granularity::Day, jst(11, 3, 0), jst(11, 2, 0)).is_err());

        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(cal.buckets(Granularity::Day, from, to).is_err());
        assert_eq!(cal.buckets(Granularity::Month, from, to).unwrap().len(), 61);
    }
}
