pub mod events;
pub mod grumbles;
pub mod purge;
pub mod stats;
pub mod users;
pub mod vibes;

use std::sync::Arc;

use crate::config::Config;
use crate::event_time::EventClock;
use crate::grumble::{DynGrumbleRepository, PurifyPolicy, SqliteGrumbleRepository};
use crate::moderation::DynContentFilter;
use crate::state::DbPool;
use crate::user::{DynUserRepository, SqliteUserRepository};
use crate::vibe::{DynVibeRepository, SqliteVibeRepository};

pub use events::{EventGrumbles, EventGrumblesQuery, EventGrumblesService};
pub use grumbles::{FilterParams, GrumbleService, PageRequest, PostGrumble, TimelinePage, TimelineQuery};
pub use purge::PurgeService;
pub use stats::{StatsQuery, StatsService};
pub use users::{AuthOutcome, Profile, RankingEntry, UserService};
pub use vibes::{AddVibeResult, VibeService};

/// Every use case, wired to one pool.
#[derive(Clone)]
pub struct Services {
    pub grumbles: Arc<GrumbleService>,
    pub vibes: Arc<VibeService>,
    pub users: Arc<UserService>,
    pub events: Arc<EventGrumblesService>,
    pub purge: Arc<PurgeService>,
    pub stats: Arc<StatsService>,
}

impl Services {
    pub fn new(
        pool: DbPool,
        config: &Config,
        clock: EventClock,
        content_filter: DynContentFilter,
    ) -> Self {
        let grumble_repo: DynGrumbleRepository =
            Arc::new(SqliteGrumbleRepository::new(pool.clone(), clock));
        let user_repo: DynUserRepository = Arc::new(SqliteUserRepository::new(pool.clone()));
        let vibe_repo: DynVibeRepository = Arc::new(SqliteVibeRepository::new(pool));

        Self {
            grumbles: Arc::new(GrumbleService::new(
                grumble_repo.clone(),
                content_filter,
                PurifyPolicy::from_config(&config.purification),
                clock,
                config.timeline.clone(),
            )),
            vibes: Arc::new(VibeService::new(grumble_repo.clone(), vibe_repo)),
            users: Arc::new(UserService::new(user_repo, config.rankings.clone())),
            events: Arc::new(EventGrumblesService::new(
                grumble_repo.clone(),
                clock,
                config.timeline.clone(),
            )),
            stats: Arc::new(StatsService::new(grumble_repo.clone(), clock, &config.stats)),
            purge: Arc::new(PurgeService::new(grumble_repo)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::error::{AppError, AppResult};
    use crate::grumble::{
        ArchivedGrumble, Grumble, GrumbleId, GrumbleRepository, Page, StatsBucket, StatsRow,
        TimelineFilter, ToxicLevel,
    };
    use crate::moderation::{ContentFilter, ModerationResult};
    use crate::user::{AnonymousUser, UserId, UserRepository};
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// 2025-11-27 12:00 JST
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 27, 3, 0, 0).unwrap()
    }

    /// Rejects anything containing "NG".
    pub struct WordFilter;

    #[async_trait]
    impl ContentFilter for WordFilter {
        async fn filter_content(&self, text: &str) -> AppResult<ModerationResult> {
            Ok(if text.contains("NG") {
                ModerationResult {
                    is_appropriate: false,
                    reason: "blocked word".to_string(),
                }
            } else {
                ModerationResult {
                    is_appropriate: true,
                    reason: "ok".to_string(),
                }
            })
        }
    }

    /// Delegates to SQLite, with injectable faults: a number of failing
    /// `mark_purified` calls and a delay before archiving.
    pub struct FaultyGrumbles {
        inner: SqliteGrumbleRepository,
        failing_purifications: AtomicUsize,
        archive_delay: Duration,
    }

    impl FaultyGrumbles {
        pub fn new(inner: SqliteGrumbleRepository) -> Self {
            Self {
                inner,
                failing_purifications: AtomicUsize::new(0),
                archive_delay: Duration::ZERO,
            }
        }

        pub fn failing_purifications(self, count: usize) -> Self {
            self.failing_purifications.store(count, Ordering::SeqCst);
            self
        }

        pub fn archive_delay(mut self, delay: Duration) -> Self {
            self.archive_delay = delay;
            self
        }
    }

    #[async_trait]
    impl GrumbleRepository for FaultyGrumbles {
        async fn create(&self, grumble: &Grumble) -> AppResult<()> {
            self.inner.create(grumble).await
        }

        async fn find_by_id(&self, id: &GrumbleId) -> AppResult<Grumble> {
            self.inner.find_by_id(id).await
        }

        async fn find_timeline(&self, filter: &TimelineFilter, page: Page) -> AppResult<Vec<Grumble>> {
            self.inner.find_timeline(filter, page).await
        }

        async fn count_timeline(&self, filter: &TimelineFilter) -> AppResult<i64> {
            self.inner.count_timeline(filter).await
        }

        async fn timeline_with_total(
            &self,
            filter: &TimelineFilter,
            page: Page,
        ) -> AppResult<(Vec<Grumble>, i64)> {
            self.inner.timeline_with_total(filter, page).await
        }

        async fn update(&self, grumble: &Grumble) -> AppResult<()> {
            self.inner.update(grumble).await
        }

        async fn increment_vibe_count(&self, id: &GrumbleId) -> AppResult<i64> {
            self.inner.increment_vibe_count(id).await
        }

        async fn mark_purified(&self, id: &GrumbleId) -> AppResult<bool> {
            let failed = self
                .failing_purifications
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(AppError::Internal("database is locked".to_string()));
            }
            self.inner.mark_purified(id).await
        }

        async fn archive_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
            tokio::time::sleep(self.archive_delay).await;
            self.inner.archive_expired(now).await
        }

        async fn find_purification_candidates(
            &self,
            threshold: Option<i64>,
        ) -> AppResult<Vec<Grumble>> {
            self.inner.find_purification_candidates(threshold).await
        }

        async fn find_archived_timeline(
            &self,
            filter: &TimelineFilter,
            date: NaiveDate,
            page: Page,
        ) -> AppResult<Vec<ArchivedGrumble>> {
            self.inner.find_archived_timeline(filter, date, page).await
        }

        async fn count_archived_timeline(
            &self,
            filter: &TimelineFilter,
            date: NaiveDate,
        ) -> AppResult<i64> {
            self.inner.count_archived_timeline(filter, date).await
        }

        async fn archived_timeline_with_total(
            &self,
            filter: &TimelineFilter,
            date: NaiveDate,
            page: Page,
        ) -> AppResult<(Vec<ArchivedGrumble>, i64)> {
            self.inner.archived_timeline_with_total(filter, date, page).await
        }

        async fn stats(&self, buckets: &[StatsBucket]) -> AppResult<Vec<StatsRow>> {
            self.inner.stats(buckets).await
        }

        async fn stats_by_toxic(
            &self,
            buckets: &[StatsBucket],
            level: Option<ToxicLevel>,
        ) -> AppResult<Vec<StatsRow>> {
            self.inner.stats_by_toxic(buckets, level).await
        }
    }

    pub struct Harness {
        pub services: Services,
        pub clock: EventClock,
        pub pool: DbPool,
        pub grumble_repo: SqliteGrumbleRepository,
        pub user_repo: SqliteUserRepository,
        pub vibe_repo: SqliteVibeRepository,
        _tmp: TempDir,
    }

    pub async fn harness() -> Harness {
        let (pool, tmp) = test_pool();
        let clock = EventClock::new(FixedOffset::east_opt(9 * 3600).unwrap(), 0, 12);
        let mut config = Config::default();
        config.purification.threshold_default = 3;

        Harness {
            services: Services::new(pool.clone(), &config, clock, Arc::new(WordFilter)),
            clock,
            pool: pool.clone(),
            grumble_repo: SqliteGrumbleRepository::new(pool.clone(), clock),
            user_repo: SqliteUserRepository::new(pool.clone()),
            vibe_repo: SqliteVibeRepository::new(pool),
            _tmp: tmp,
        }
    }

    impl Harness {
        pub async fn user(&self) -> UserId {
            let user = AnonymousUser::new(UserId::generate(), t0());
            self.user_repo.create(&user).await.unwrap();
            user.user_id
        }

        pub async fn post_as(&self, author: &UserId, threshold: Option<i64>) -> Grumble {
            self.services
                .grumbles
                .post(
                    PostGrumble {
                        user_id: author.clone(),
                        content: "meetings all afternoon".to_string(),
                        toxic_level: 2,
                        purified_threshold: threshold,
                        is_event_grumble: false,
                    },
                    t0(),
                )
                .await
                .unwrap()
        }
    }
}
