// Posting and the live timeline
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimelineConfig;
use crate::error::{AppError, AppResult};
use crate::event_time::EventClock;
use crate::grumble::{DynGrumbleRepository, Grumble, GrumbleId, Page, PurifyPolicy, TimelineFilter, ToxicLevel};
use crate::moderation::DynContentFilter;
use crate::user::UserId;

#[derive(Debug, Clone)]
pub struct PostGrumble {
    pub user_id: UserId,
    pub content: String,
    pub toxic_level: i64,
    pub purified_threshold: Option<i64>,
    pub is_event_grumble: bool,
}

/// Page-based or offset-based paging as received from the caller.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    #[serde(alias = "limit")]
    pub page_size: Option<i64>,
    pub offset: Option<i64>,
}

impl PageRequest {
    /// Size falls back to the default when missing or non-positive and is
    /// capped at the maximum. A positive offset wins over the page number.
    pub fn resolve(&self, config: &TimelineConfig) -> Page {
        let size = match self.page_size {
            Some(s) if s > 0 => s.min(config.page_size_max),
            _ => config.page_size_default,
        };
        match self.offset {
            Some(offset) if offset > 0 => Page::new(size, offset),
            _ => Page::from_page_number(self.page.unwrap_or(1), size),
        }
    }
}

/// Filter dimensions shared by the live timeline and the event archive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub toxic_level_min: Option<i64>,
    pub toxic_level_max: Option<i64>,
    pub is_purified: Option<bool>,
}

impl FilterParams {
    pub(crate) fn to_filter(&self) -> AppResult<TimelineFilter> {
        let level = |field: &str, raw: Option<i64>| -> AppResult<Option<ToxicLevel>> {
            raw.map(|v| {
                ToxicLevel::new(v).map_err(|_| {
                    AppError::validation(field, format!("{field} must be between 1 and 5"))
                })
            })
            .transpose()
        };
        let filter = TimelineFilter {
            toxic_level_min: level("toxic_level_min", self.toxic_level_min)?,
            toxic_level_max: level("toxic_level_max", self.toxic_level_max)?,
            is_purified: self.is_purified,
            ..TimelineFilter::default()
        };
        filter.validate()?;
        Ok(filter)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub filter: FilterParams,
    pub user_id: Option<UserId>,
    pub viewer: Option<UserId>,
    pub paging: PageRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePage {
    pub grumbles: Vec<Grumble>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub struct GrumbleService {
    grumbles: DynGrumbleRepository,
    content_filter: DynContentFilter,
    policy: PurifyPolicy,
    clock: EventClock,
    timeline: TimelineConfig,
}

impl GrumbleService {
    pub fn new(
        grumbles: DynGrumbleRepository,
        content_filter: DynContentFilter,
        policy: PurifyPolicy,
        clock: EventClock,
        timeline: TimelineConfig,
    ) -> Self {
        Self {
            grumbles,
            content_filter,
            policy,
            clock,
            timeline,
        }
    }

    pub async fn post(&self, req: PostGrumble, now: DateTime<Utc>) -> AppResult<Grumble> {
        let toxic_level = ToxicLevel::new(req.toxic_level)?;

        let grumble = Grumble {
            grumble_id: GrumbleId::generate(),
            user_id: req.user_id,
            content: req.content,
            toxic_level,
            vibe_count: 0,
            purified_threshold: self.policy.resolve_threshold(req.purified_threshold)?,
            is_purified: false,
            posted_at: now,
            expires_at: self.clock.next_midnight(now),
            is_event_grumble: req.is_event_grumble,
            has_vibed: None,
        };
        grumble.validate()?;

        let verdict = self.content_filter.filter_content(&grumble.content).await?;
        if !verdict.is_appropriate {
            tracing::info!(user_id = %grumble.user_id, reason = %verdict.reason, "Grumble rejected by moderation");
            return Err(AppError::InappropriateContent(verdict.reason));
        }

        self.grumbles.create(&grumble).await?;
        tracing::debug!(grumble_id = %grumble.grumble_id, expires_at = %grumble.expires_at, "Grumble posted");

        Ok(grumble)
    }

    pub async fn timeline(&self, query: TimelineQuery, now: DateTime<Utc>) -> AppResult<TimelinePage> {
        let filter = TimelineFilter {
            exclude_expired: true,
            as_of: Some(now),
            user_id: query.user_id,
            viewer_user_id: query.viewer,
            ..query.filter.to_filter()?
        };
        let page = query.paging.resolve(&self.timeline);

        let (grumbles, total) = self.grumbles.timeline_with_total(&filter, page).await?;
        Ok(TimelinePage {
            grumbles,
            total,
            page: page.number(),
            page_size: page.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grumble::GrumbleRepository;
    use crate::services::test_support::{harness, t0};
    use chrono::Duration;

    fn post_req(user_id: &UserId, content: &str) -> PostGrumble {
        PostGrumble {
            user_id: user_id.clone(),
            content: content.to_string(),
            toxic_level: 2,
            purified_threshold: None,
            is_event_grumble: false,
        }
    }

    #[test]
    fn page_request_resolution() {
        let cfg = TimelineConfig::default();
        let page = PageRequest::default().resolve(&cfg);
        assert_eq!((page.limit, page.offset, page.number()), (20, 0, 1));

        let page = PageRequest { page: Some(3), page_size: Some(10), offset: None }.resolve(&cfg);
        assert_eq!((page.limit, page.offset), (10, 20));

        let page = PageRequest { page: Some(9), page_size: Some(10), offset: Some(25) }.resolve(&cfg);
        assert_eq!((page.offset, page.number()), (25, 3));

        let page = PageRequest { page: None, page_size: Some(0), offset: Some(-4) }.resolve(&cfg);
        assert_eq!((page.limit, page.offset), (20, 0));

        let page = PageRequest { page_size: Some(5000), ..Default::default() }.resolve(&cfg);
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn filter_params_validate_levels() {
        let bad = FilterParams { toxic_level_min: Some(0), ..Default::default() };
        assert!(matches!(bad.to_filter(), Err(AppError::Validation { ref field, .. }) if field == "toxic_level_min"));

        let inverted = FilterParams {
            toxic_level_min: Some(4),
            toxic_level_max: Some(2),
            ..Default::default()
        };
        assert!(inverted.to_filter().is_err());
    }

    #[tokio::test]
    async fn post_assigns_next_midnight_and_default_threshold() {
        let h = harness().await;
        let author = h.user().await;

        let g = h
            .services
            .grumbles
            .post(post_req(&author, "  printer jammed  "), t0())
            .await
            .unwrap();
        assert_eq!(g.content, "  printer jammed  ");
        assert_eq!(g.vibe_count, 0);
        assert_eq!(g.purified_threshold, 3);
        assert_eq!(g.expires_at, h.clock.next_midnight(t0()));
        assert!(g.expires_at > g.posted_at);
    }

    #[tokio::test]
    async fn post_validates_before_storing() {
        let h = harness().await;
        let author = h.user().await;
        let svc = &h.services.grumbles;

        assert!(matches!(svc.post(post_req(&author, ""), t0()).await, Err(AppError::Validation { .. })));
        assert!(matches!(svc.post(post_req(&author, &"x".repeat(281)), t0()).await, Err(AppError::Validation { .. })));

        let mut req = post_req(&author, "ok");
        req.toxic_level = 6;
        assert!(matches!(svc.post(req, t0()).await, Err(AppError::Validation { .. })));

        let mut req = post_req(&author, "ok");
        req.purified_threshold = Some(0);
        assert!(matches!(svc.post(req, t0()).await, Err(AppError::Validation { .. })));

        let rejected = svc.post(post_req(&author, "this is NG"), t0()).await;
        assert!(matches!(rejected, Err(AppError::InappropriateContent(ref r)) if r == "blocked word"));

        let page = svc.timeline(TimelineQuery::default(), t0()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn whitespace_content_is_stored_verbatim() {
        let h = harness().await;
        let author = h.user().await;
        let svc = &h.services.grumbles;

        let blank = svc.post(post_req(&author, "   "), t0()).await.unwrap();
        assert_eq!(blank.content, "   ");

        let stored = h.grumble_repo.find_by_id(&blank.grumble_id).await.unwrap();
        assert_eq!(stored.content, "   ");
    }

    #[tokio::test]
    async fn timeline_hides_expired_and_reports_paging() {
        let h = harness().await;
        let author = h.user().await;
        let svc = &h.services.grumbles;

        for i in 0..3 {
            svc.post(post_req(&author, &format!("grumble {i}")), t0() + Duration::minutes(i))
                .await
                .unwrap();
        }

        let query = TimelineQuery {
            paging: PageRequest { page: Some(2), page_size: Some(2), offset: None },
            ..Default::default()
        };
        let page = svc.timeline(query.clone(), t0() + Duration::hours(1)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.grumbles.len(), 1);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 2);
        assert_eq!(page.grumbles[0].content, "grumble 0");

        // After local midnight everything has expired
        let later = h.clock.next_midnight(t0());
        let page = svc.timeline(query, later).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.grumbles.is_empty());
    }
}
