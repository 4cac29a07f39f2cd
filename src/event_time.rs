// Local-day arithmetic for expiry and the morning archive window.
//
// Everything here is a pure function of `now` and the injected zone, so
// callers (and tests) choose the timezone instead of reading process state.
use chrono::{
    DateTime, Days, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;

use crate::config::EventConfig;

/// Inclusive `[start, end]` of one local calendar day, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A named zone follows daylight saving; a fixed offset never moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, Copy)]
pub struct EventClock {
    zone: Zone,
    start_hour: u32,
    end_hour: u32,
}

impl EventClock {
    pub fn new(offset: FixedOffset, start_hour: u32, end_hour: u32) -> Self {
        Self {
            zone: Zone::Fixed(offset),
            start_hour,
            end_hour,
        }
    }

    pub fn named(tz: Tz, start_hour: u32, end_hour: u32) -> Self {
        Self {
            zone: Zone::Named(tz),
            start_hour,
            end_hour,
        }
    }

    /// The IANA zone when it resolves, otherwise the configured fixed offset.
    pub fn from_config(config: &EventConfig) -> anyhow::Result<Self> {
        let offset = config.offset()?;
        let name = config.timezone.trim();
        if name.is_empty() {
            return Ok(Self::new(offset, config.start_hour, config.end_hour));
        }
        match name.parse::<Tz>() {
            Ok(tz) => Ok(Self::named(tz, config.start_hour, config.end_hour)),
            Err(e) => {
                tracing::warn!(
                    timezone = %name,
                    fallback = %offset,
                    "Unknown timezone, using fixed offset: {}",
                    e
                );
                Ok(Self::new(offset, config.start_hour, config.end_hour))
            }
        }
    }

    /// Same window, different zone.
    pub fn in_zone(self, zone: Zone) -> Self {
        Self { zone, ..self }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self.zone {
            Zone::Named(tz) => now.with_timezone(&tz).naive_local(),
            Zone::Fixed(offset) => now.with_timezone(&offset).naive_local(),
        }
    }

    fn to_utc(&self, local: NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        match self.zone {
            Zone::Named(tz) => tz.from_local_datetime(&local).map(|t| t.with_timezone(&Utc)),
            Zone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    /// True while the local hour is in `[start_hour, end_hour)`.
    pub fn is_event_window(&self, now: DateTime<Utc>) -> bool {
        let hour = self.local(now).hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date()
    }

    /// The day whose posts the archive shows: yesterday during the window.
    pub fn target_archive_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.local_date(now);
        if self.is_event_window(now) {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        }
    }

    /// Start of the local day. When midnight is skipped by a DST jump the day
    /// starts at the first local time that exists.
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let mut local = date.and_time(NaiveTime::MIN);
        for _ in 0..4 {
            if let Some(t) = self.to_utc(local).earliest() {
                return t;
            }
            local += chrono::Duration::hours(1);
        }
        // No zone skips more than a few hours; treat the wall time as UTC.
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }

    /// Local days are 23, 24 or 25 hours long.
    pub fn day_bounds(&self, date: NaiveDate) -> DayBounds {
        let start = self.local_midnight(date);
        let next = date.succ_opt().unwrap_or(date);
        let end = if next == date {
            start + chrono::Duration::hours(24)
        } else {
            self.local_midnight(next)
        };
        DayBounds {
            start,
            end: end - chrono::Duration::seconds(1),
        }
    }

    /// First local midnight strictly after `now`.
    pub fn next_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        self.local_midnight(tomorrow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> EventClock {
        EventClock::new(FixedOffset::east_opt(9 * 3600).unwrap(), 0, 12)
    }

    fn at_jst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn next_midnight_one_minute_before() {
        let clock = jst();
        assert_eq!(
            clock.next_midnight(at_jst(2025, 11, 27, 23, 59)),
            at_jst(2025, 11, 28, 0, 0)
        );
    }

    #[test]
    fn next_midnight_is_strictly_after() {
        let clock = jst();
        assert_eq!(
            clock.next_midnight(at_jst(2025, 11, 27, 0, 0)),
            at_jst(2025, 11, 28, 0, 0)
        );
    }

    #[test]
    fn next_midnight_crosses_month_and_year() {
        let clock = jst();
        assert_eq!(
            clock.next_midnight(at_jst(2025, 12, 31, 18, 0)),
            at_jst(2026, 1, 1, 0, 0)
        );
    }

    #[test]
    fn event_window_edges() {
        let clock = jst();
        assert!(clock.is_event_window(at_jst(2025, 11, 27, 0, 0)));
        assert!(clock.is_event_window(at_jst(2025, 11, 27, 11, 59)));
        assert!(!clock.is_event_window(at_jst(2025, 11, 27, 12, 0)));
        assert!(!clock.is_event_window(at_jst(2025, 11, 27, 23, 59)));
    }

    #[test]
    fn archive_date_is_previous_day_in_the_morning() {
        let clock = jst();
        let date = clock.target_archive_date(at_jst(2025, 11, 27, 3, 0));
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());

        let afternoon = clock.target_archive_date(at_jst(2025, 11, 27, 15, 0));
        assert_eq!(afternoon, NaiveDate::from_ymd_opt(2025, 11, 27).unwrap());
    }

    #[test]
    fn local_date_differs_from_utc_date() {
        let clock = jst();
        // 2025-11-27 01:00 JST is still 11-26 in UTC
        let now = at_jst(2025, 11, 27, 1, 0);
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());
        assert_eq!(clock.local_date(now), NaiveDate::from_ymd_opt(2025, 11, 27).unwrap());
    }

    #[test]
    fn day_bounds_span_one_local_day() {
        let clock = jst();
        let bounds = clock.day_bounds(NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());
        assert_eq!(bounds.start, at_jst(2025, 11, 26, 0, 0));
        assert_eq!(
            bounds.end,
            at_jst(2025, 11, 26, 23, 59) + chrono::Duration::seconds(59)
        );
        assert_eq!(bounds.start.to_rfc3339(), "2025-11-25T15:00:00+00:00");
    }

    #[test]
    fn arbitrary_offsets_are_honored() {
        let west = EventClock::new(FixedOffset::west_opt(5 * 3600).unwrap(), 0, 12);
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap();
        // 22:00 on the 9th locally
        assert!(!west.is_event_window(now));
        assert_eq!(west.local_date(now), NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(
            west.next_midnight(now),
            Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap()
        );

        let utc = EventClock::new(FixedOffset::east_opt(0).unwrap(), 6, 9);
        assert!(utc.is_event_window(Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()));
        assert!(!utc.is_event_window(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()));
    }

    #[test]
    fn from_config_prefers_named_zone() {
        let clock = EventClock::from_config(&EventConfig::default()).unwrap();
        assert_eq!(clock.zone(), Zone::Named(chrono_tz::Asia::Tokyo));

        let config = EventConfig {
            timezone: "Not/AZone".to_string(),
            ..EventConfig::default()
        };
        let clock = EventClock::from_config(&config).unwrap();
        assert_eq!(
            clock.zone(),
            Zone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap())
        );

        let config = EventConfig {
            timezone: String::new(),
            utc_offset: "-05:00".to_string(),
            ..EventConfig::default()
        };
        let clock = EventClock::from_config(&config).unwrap();
        assert_eq!(
            clock.zone(),
            Zone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap())
        );
    }

    #[test]
    fn named_zone_follows_daylight_saving() {
        let ny = EventClock::named(chrono_tz::America::New_York, 0, 12);

        // Winter: UTC-5
        let jan = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(
            ny.local_midnight(jan),
            Utc.with_ymd_and_hms(2025, 1, 15, 5, 0, 0).unwrap()
        );

        // Summer: UTC-4
        let jul = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        assert_eq!(
            ny.local_midnight(jul),
            Utc.with_ymd_and_hms(2025, 7, 15, 4, 0, 0).unwrap()
        );
        let evening = Utc.with_ymd_and_hms(2025, 7, 16, 2, 30, 0).unwrap(); // 22:30 local
        assert_eq!(
            ny.next_midnight(evening),
            Utc.with_ymd_and_hms(2025, 7, 16, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn dst_days_are_not_24_hours() {
        let ny = EventClock::named(chrono_tz::America::New_York, 0, 12);

        // 2025-03-09 springs forward: 23 hours
        let spring = ny.day_bounds(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(
            spring.end - spring.start,
            chrono::Duration::hours(23) - chrono::Duration::seconds(1)
        );

        // 2025-11-02 falls back: 25 hours
        let fall = ny.day_bounds(NaiveDate::from_ymd_opt(2025, 11, 2).unwrap());
        assert_eq!(
            fall.end - fall.start,
            chrono::Duration::hours(25) - chrono::Duration::seconds(1)
        );
    }

    #[test]
    fn skipped_midnight_starts_at_first_valid_hour() {
        // Santiago skips 00:00-01:00 on 2024-09-08
        let scl = EventClock::named(chrono_tz::America::Santiago, 0, 12);
        let start = scl.local_midnight(NaiveDate::from_ymd_opt(2024, 9, 8).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 9, 8, 4, 0, 0).unwrap());
    }

    #[test]
    fn in_zone_keeps_window() {
        let clock = jst().in_zone(Zone::Fixed(FixedOffset::east_opt(0).unwrap()));
        assert!(clock.is_event_window(Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap()));
        assert!(!clock.is_event_window(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()));
    }
}
