// The morning archive of yesterday's grumbles
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::TimelineConfig;
use crate::error::AppResult;
use crate::event_time::EventClock;
use crate::grumble::{ArchivedGrumble, DynGrumbleRepository, TimelineFilter};
use crate::user::UserId;

use super::grumbles::{FilterParams, PageRequest};

#[derive(Debug, Clone, Default)]
pub struct EventGrumblesQuery {
    pub filter: FilterParams,
    pub viewer: Option<UserId>,
    pub paging: PageRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventGrumbles {
    pub grumbles: Vec<ArchivedGrumble>,
    pub total: i64,
    pub is_event_active: bool,
    pub event_date: Option<NaiveDate>,
}

pub struct EventGrumblesService {
    grumbles: DynGrumbleRepository,
    clock: EventClock,
    timeline: TimelineConfig,
}

impl EventGrumblesService {
    pub fn new(grumbles: DynGrumbleRepository, clock: EventClock, timeline: TimelineConfig) -> Self {
        Self {
            grumbles,
            clock,
            timeline,
        }
    }

    /// Empty and inactive outside the window; otherwise the archived posts
    /// of the previous local day.
    pub async fn get(&self, query: EventGrumblesQuery, now: DateTime<Utc>) -> AppResult<EventGrumbles> {
        let base = query.filter.to_filter()?;
        if !self.clock.is_event_window(now) {
            return Ok(EventGrumbles {
                grumbles: Vec::new(),
                total: 0,
                is_event_active: false,
                event_date: None,
            });
        }

        let date = self.clock.target_archive_date(now);
        let filter = TimelineFilter {
            viewer_user_id: query.viewer,
            ..base
        };
        let page = query.paging.resolve(&self.timeline);

        let (grumbles, total) = self
            .grumbles
            .archived_timeline_with_total(&filter, date, page)
            .await?;

        Ok(EventGrumbles {
            grumbles,
            total,
            is_event_active: true,
            event_date: Some(date),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::harness;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn jst(d: u32, h: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 11, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn outside_window_is_inactive() {
        let h = harness().await;
        let result = h
            .services
            .events
            .get(EventGrumblesQuery::default(), jst(27, 13))
            .await
            .unwrap();
        assert!(!result.is_event_active);
        assert_eq!(result.total, 0);
        assert!(result.event_date.is_none());
    }

    #[tokio::test]
    async fn morning_shows_yesterdays_archive() {
        let h = harness().await;
        let author = h.user().await;
        let svc = &h.services.grumbles;

        // Two posts on the 26th (JST), one on the 27th
        for posted in [jst(26, 10), jst(26, 20), jst(27, 1)] {
            svc.post(
                crate::services::grumbles::PostGrumble {
                    user_id: author.clone(),
                    content: format!("posted {posted}"),
                    toxic_level: 3,
                    purified_threshold: None,
                    is_event_grumble: true,
                },
                posted,
            )
            .await
            .unwrap();
        }
        let morning = jst(27, 3);
        assert_eq!(h.services.purge.purge_expired(morning).await.unwrap(), 2);

        let result = h
            .services
            .events
            .get(EventGrumblesQuery::default(), morning)
            .await
            .unwrap();
        assert!(result.is_event_active);
        assert_eq!(result.event_date, NaiveDate::from_ymd_opt(2025, 11, 26));
        assert_eq!(result.total, 2);
        assert_eq!(result.grumbles.len(), 2);
        // Newest first
        assert!(result.grumbles[0].grumble.posted_at > result.grumbles[1].grumble.posted_at);
        assert!(result.grumbles.iter().all(|g| g.grumble.is_event_grumble));

        let one_per_page = EventGrumblesQuery {
            paging: PageRequest {
                page_size: Some(1),
                offset: Some(1),
                page: None,
            },
            ..Default::default()
        };
        let second = h.services.events.get(one_per_page, morning + Duration::hours(8)).await.unwrap();
        assert_eq!(second.total, 2);
        assert_eq!(second.grumbles.len(), 1);
        assert_eq!(second.grumbles[0].grumble.posted_at, jst(26, 10));
    }

    #[tokio::test]
    async fn invalid_filter_fails_even_outside_window() {
        let h = harness().await;
        let query = EventGrumblesQuery {
            filter: FilterParams {
                toxic_level_min: Some(9),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(h.services.events.get(query, jst(27, 15)).await.is_err());
    }
}
