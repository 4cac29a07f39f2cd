// Aggregate counts per day, week or month
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::StatsConfig;
use crate::error::{AppError, AppResult};
use crate::event_time::{EventClock, Zone};
use crate::grumble::{
    BucketCalendar, DynGrumbleRepository, Granularity, StatsBucket, StatsRow, ToxicLevel,
};

#[derive(Debug, Clone)]
pub struct StatsQuery {
    pub granularity: Granularity,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// IANA zone overriding the configured one for bucket alignment
    pub tz: Option<String>,
}

impl StatsQuery {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            from: None,
            to: None,
            tz: None,
        }
    }
}

pub struct StatsService {
    grumbles: DynGrumbleRepository,
    clock: EventClock,
    week_starts_on_sunday: bool,
}

impl StatsService {
    pub fn new(grumbles: DynGrumbleRepository, clock: EventClock, config: &StatsConfig) -> Self {
        Self {
            grumbles,
            clock,
            week_starts_on_sunday: config.week_starts_on_sunday,
        }
    }

    fn calendar(&self, tz: Option<&str>) -> AppResult<BucketCalendar> {
        let clock = match tz.map(str::trim).filter(|t| !t.is_empty()) {
            Some(name) => {
                let zone = name
                    .parse::<Tz>()
                    .map_err(|_| AppError::validation("tz", format!("unknown timezone {name:?}")))?;
                self.clock.in_zone(Zone::Named(zone))
            }
            None => self.clock,
        };
        Ok(BucketCalendar::new(clock, self.week_starts_on_sunday))
    }

    /// Explicit `[from, to)` when both ends are given, otherwise the bucket
    /// containing `now`.
    pub fn buckets(&self, query: &StatsQuery, now: DateTime<Utc>) -> AppResult<Vec<StatsBucket>> {
        let calendar = self.calendar(query.tz.as_deref())?;
        let (from, to) = match (query.from, query.to) {
            (Some(from), Some(to)) => (from, to),
            _ => calendar.current(query.granularity, now),
        };
        calendar.buckets(query.granularity, from, to)
    }

    pub async fn stats(&self, query: &StatsQuery, now: DateTime<Utc>) -> AppResult<Vec<StatsRow>> {
        let buckets = self.buckets(query, now)?;
        self.grumbles.stats(&buckets).await
    }

    pub async fn stats_by_toxic(
        &self,
        query: &StatsQuery,
        toxic_level: Option<i64>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<StatsRow>> {
        let level = toxic_level.map(ToxicLevel::new).transpose()?;
        let buckets = self.buckets(query, now)?;
        self.grumbles.stats_by_toxic(&buckets, level).await
    }
}
