// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::{self, encode_time, time_column};
use crate::error::{AppError, AppResult};
use crate::event_time::EventClock;
use crate::state::DbPool;
use crate::user::UserId;

use super::domain::{ArchivedGrumble, Grumble, GrumbleId, ToxicLevel};
use super::filter::{where_clause, Page, PostedRange, TimelineFilter};
use super::stats::{StatsBucket, StatsRow};

#[async_trait]
pub trait GrumbleRepository: Send + Sync {
    /// Persists a new grumble with `vibe_count = 0`.
    async fn create(&self, grumble: &Grumble) -> AppResult<()>;

    async fn find_by_id(&self, id: &GrumbleId) -> AppResult<Grumble>;

    /// Newest first.
    async fn find_timeline(&self, filter: &TimelineFilter, page: Page) -> AppResult<Vec<Grumble>>;

    async fn count_timeline(&self, filter: &TimelineFilter) -> AppResult<i64>;

    /// Page and total read from one snapshot.
    async fn timeline_with_total(
        &self,
        filter: &TimelineFilter,
        page: Page,
    ) -> AppResult<(Vec<Grumble>, i64)>;

    /// Full-row write of the mutable fields. `vibe_count` and `is_purified`
    /// never move backwards.
    async fn update(&self, grumble: &Grumble) -> AppResult<()>;

    /// Atomic `+1`, returns the new count.
    async fn increment_vibe_count(&self, id: &GrumbleId) -> AppResult<i64>;

    /// Flips `is_purified` iff the stored count has reached the stored
    /// threshold. Returns whether this call made the transition.
    async fn mark_purified(&self, id: &GrumbleId) -> AppResult<bool>;

    /// Moves every grumble with `expires_at <= now` into the archive.
    async fn archive_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;

    /// Unpurified grumbles at or above `threshold`, or above their own
    /// threshold when none is given.
    async fn find_purification_candidates(&self, threshold: Option<i64>)
        -> AppResult<Vec<Grumble>>;

    async fn find_archived_timeline(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
        page: Page,
    ) -> AppResult<Vec<ArchivedGrumble>>;

    async fn count_archived_timeline(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
    ) -> AppResult<i64>;

    /// Archive page and total read from one snapshot.
    async fn archived_timeline_with_total(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
        page: Page,
    ) -> AppResult<(Vec<ArchivedGrumble>, i64)>;

    /// Purified/unpurified counts and vibe totals per bucket, over live and
    /// archived grumbles. Buckets without posts are omitted.
    async fn stats(&self, buckets: &[StatsBucket]) -> AppResult<Vec<StatsRow>>;

    /// As `stats`, split by toxic level, optionally for one level only.
    async fn stats_by_toxic(
        &self,
        buckets: &[StatsBucket],
        level: Option<ToxicLevel>,
    ) -> AppResult<Vec<StatsRow>>;
}

pub type DynGrumbleRepository = Arc<dyn GrumbleRepository>;

pub struct SqliteGrumbleRepository {
    pool: DbPool,
    clock: EventClock,
}

impl SqliteGrumbleRepository {
    pub fn new(pool: DbPool, clock: EventClock) -> Self {
        Self { pool, clock }
    }

    /// `[start, end + 1s)` so sub-second posts in the last second still count.
    fn posted_range(&self, date: NaiveDate) -> PostedRange {
        let bounds = self.clock.day_bounds(date);
        Some((bounds.start, bounds.end + Duration::seconds(1)))
    }
}

const GRUMBLE_COLUMNS: &str = "g.grumble_id, g.user_id, g.content, g.toxic_level, g.vibe_count, \
     g.purified_threshold, g.is_purified, g.posted_at, g.expires_at, g.is_event_grumble";

const ARCHIVE_COPY_COLUMNS: &str = "grumble_id, user_id, content, toxic_level, vibe_count, \
     purified_threshold, is_purified, posted_at, expires_at, is_event_grumble";

fn map_grumble(row: &Row<'_>) -> rusqlite::Result<Grumble> {
    let level: i64 = row.get(3)?;
    let toxic_level =
        ToxicLevel::new(level).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(3, level))?;

    Ok(Grumble {
        grumble_id: GrumbleId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        content: row.get(2)?,
        toxic_level,
        vibe_count: row.get(4)?,
        purified_threshold: row.get(5)?,
        is_purified: row.get(6)?,
        posted_at: time_column(row, 7)?,
        expires_at: time_column(row, 8)?,
        is_event_grumble: row.get(9)?,
        has_vibed: None,
    })
}

fn map_timeline_row(row: &Row<'_>) -> rusqlite::Result<Grumble> {
    let mut grumble = map_grumble(row)?;
    grumble.has_vibed = row.get(10)?;
    Ok(grumble)
}

fn map_archived_row(row: &Row<'_>) -> rusqlite::Result<ArchivedGrumble> {
    let mut grumble = map_grumble(row)?;
    grumble.has_vibed = row.get(11)?;
    Ok(ArchivedGrumble {
        grumble,
        archived_at: time_column(row, 10)?,
    })
}

/// Correlated per-row existence check, or a NULL column without a viewer.
fn has_vibed_column(filter: &TimelineFilter, params: &mut Vec<Value>) -> &'static str {
    match &filter.viewer_user_id {
        Some(viewer) => {
            params.push(Value::Text(viewer.as_str().to_string()));
            "EXISTS (SELECT 1 FROM vibes v WHERE v.grumble_id = g.grumble_id AND v.user_id = ?)"
        }
        None => "NULL",
    }
}

fn query_timeline<T>(
    conn: &Connection,
    table: &str,
    extra_columns: &str,
    filter: &TimelineFilter,
    posted: PostedRange,
    page: Page,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> AppResult<Vec<T>> {
    let mut params: Vec<Value> = Vec::new();
    let has_vibed = has_vibed_column(filter, &mut params);
    let clause = where_clause(filter, posted);
    params.extend(clause.params);
    params.push(Value::Integer(page.limit));
    params.push(Value::Integer(page.offset));

    let sql = format!(
        "SELECT {GRUMBLE_COLUMNS}{extra_columns}, {has_vibed} AS has_vibed
         FROM {table} g
         {}
         ORDER BY g.posted_at DESC
         LIMIT ? OFFSET ?",
        clause.sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn count_rows(
    conn: &Connection,
    table: &str,
    filter: &TimelineFilter,
    posted: PostedRange,
) -> AppResult<i64> {
    let clause = where_clause(filter, posted);
    let sql = format!("SELECT COUNT(*) FROM {table} g {}", clause.sql);
    let count = conn.query_row(&sql, params_from_iter(clause.params), |row| row.get(0))?;
    Ok(count)
}

fn query_stats(
    conn: &Connection,
    buckets: &[StatsBucket],
    by_toxic: bool,
    level: Option<ToxicLevel>,
) -> AppResult<Vec<StatsRow>> {
    if buckets.is_empty() {
        return Ok(Vec::new());
    }

    let mut params: Vec<Value> = Vec::with_capacity(buckets.len() * 3 + 1);
    for b in buckets {
        params.push(Value::Text(encode_time(&b.label)));
        params.push(Value::Text(encode_time(&b.start)));
        params.push(Value::Text(encode_time(&b.end)));
    }
    let values = vec!["(?, ?, ?)"; buckets.len()].join(", ");

    let (level_column, level_filter, level_group) = if by_toxic {
        let filter = match level {
            Some(l) => {
                params.push(Value::Integer(l.get()));
                "WHERE p.toxic_level = ?"
            }
            None => "",
        };
        ("p.toxic_level", filter, ", p.toxic_level")
    } else {
        ("NULL", "", "")
    };

    let sql = format!(
        "WITH buckets(label, lo, hi) AS (VALUES {values}),
         posts AS (
             SELECT posted_at, is_purified, vibe_count, toxic_level FROM grumbles
             UNION ALL
             SELECT posted_at, is_purified, vibe_count, toxic_level FROM grumbles_archive
         )
         SELECT b.label, {level_column},
                SUM(CASE WHEN p.is_purified THEN 1 ELSE 0 END),
                SUM(CASE WHEN p.is_purified THEN 0 ELSE 1 END),
                SUM(p.vibe_count)
         FROM buckets b
         JOIN posts p ON p.posted_at >= b.lo AND p.posted_at < b.hi
         {level_filter}
         GROUP BY b.label{level_group}
         ORDER BY b.label{level_group}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let toxic_level = row
                .get::<_, Option<i64>>(1)?
                .map(|l| {
                    ToxicLevel::new(l).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, l))
                })
                .transpose()?;
            Ok(StatsRow {
                bucket: time_column(row, 0)?,
                toxic_level,
                purified_count: row.get(2)?,
                unpurified_count: row.get(3)?,
                total_vibes: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Single-statement increment, usable inside a larger transaction.
pub(crate) fn increment_vibe_count_on(conn: &Connection, id: &GrumbleId) -> AppResult<i64> {
    conn.query_row(
        "UPDATE grumbles SET vibe_count = vibe_count + 1
         WHERE grumble_id = ?1
         RETURNING vibe_count",
        params![id.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Grumble", id.as_str()))
}

#[async_trait]
impl GrumbleRepository for SqliteGrumbleRepository {
    async fn create(&self, grumble: &Grumble) -> AppResult<()> {
        grumble.validate()?;
        let g = grumble.clone();

        db::with_conn(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO grumbles (grumble_id, user_id, content, toxic_level, vibe_count,
                    purified_threshold, is_purified, posted_at, expires_at, is_event_grumble)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, 0, ?6, ?7, ?8)",
                params![
                    g.grumble_id.as_str(),
                    g.user_id.as_str(),
                    g.content,
                    g.toxic_level.get(),
                    g.purified_threshold,
                    encode_time(&g.posted_at),
                    encode_time(&g.expires_at),
                    g.is_event_grumble
                ],
            )
            .map_err(|e| {
                if db::is_foreign_key_violation(&e) {
                    AppError::not_found("User", g.user_id.as_str())
                } else if db::is_unique_violation(&e) {
                    AppError::validation("grumble_id", "grumble already exists")
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &GrumbleId) -> AppResult<Grumble> {
        let id = id.clone();

        db::with_conn(&self.pool, move |conn| {
            conn.query_row(
                &format!("SELECT {GRUMBLE_COLUMNS} FROM grumbles g WHERE g.grumble_id = ?1"),
                params![id.as_str()],
                map_grumble,
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("Grumble", id.as_str()))
        })
        .await
    }

    async fn find_timeline(&self, filter: &TimelineFilter, page: Page) -> AppResult<Vec<Grumble>> {
        filter.validate()?;
        let filter = filter.clone();

        db::with_conn(&self.pool, move |conn| {
            query_timeline(conn, "grumbles", "", &filter, None, page, map_timeline_row)
        })
        .await
    }

    async fn count_timeline(&self, filter: &TimelineFilter) -> AppResult<i64> {
        filter.validate()?;
        let filter = filter.clone();

        db::with_conn(&self.pool, move |conn| {
            count_rows(conn, "grumbles", &filter, None)
        })
        .await
    }

    async fn timeline_with_total(
        &self,
        filter: &TimelineFilter,
        page: Page,
    ) -> AppResult<(Vec<Grumble>, i64)> {
        filter.validate()?;
        let filter = filter.clone();

        db::with_conn(&self.pool, move |conn| {
            let tx = conn.transaction()?;
            let grumbles =
                query_timeline(&tx, "grumbles", "", &filter, None, page, map_timeline_row)?;
            let total = count_rows(&tx, "grumbles", &filter, None)?;
            tx.commit()?;
            Ok((grumbles, total))
        })
        .await
    }

    async fn update(&self, grumble: &Grumble) -> AppResult<()> {
        grumble.validate()?;
        let g = grumble.clone();

        db::with_conn(&self.pool, move |conn| {
            let rows = conn.execute(
                "UPDATE grumbles
                 SET content = ?2,
                     toxic_level = ?3,
                     vibe_count = MAX(vibe_count, ?4),
                     is_purified = MAX(is_purified, ?5),
                     expires_at = ?6,
                     is_event_grumble = ?7
                 WHERE grumble_id = ?1",
                params![
                    g.grumble_id.as_str(),
                    g.content,
                    g.toxic_level.get(),
                    g.vibe_count,
                    g.is_purified,
                    encode_time(&g.expires_at),
                    g.is_event_grumble
                ],
            )?;
            if rows == 0 {
                return Err(AppError::not_found("Grumble", g.grumble_id.as_str()));
            }
            Ok(())
        })
        .await
    }

    async fn increment_vibe_count(&self, id: &GrumbleId) -> AppResult<i64> {
        let id = id.clone();
        db::with_conn(&self.pool, move |conn| increment_vibe_count_on(conn, &id)).await
    }

    async fn mark_purified(&self, id: &GrumbleId) -> AppResult<bool> {
        let id = id.clone();

        db::with_conn(&self.pool, move |conn| {
            let rows = conn.execute(
                "UPDATE grumbles SET is_purified = 1
                 WHERE grumble_id = ?1
                   AND is_purified = 0
                   AND vibe_count >= purified_threshold",
                params![id.as_str()],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn archive_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let now = encode_time(&now);

        db::with_conn(&self.pool, move |conn| {
            db::immediate_transaction(conn, |tx| {
                tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO grumbles_archive ({ARCHIVE_COPY_COLUMNS}, archived_at)
                         SELECT {ARCHIVE_COPY_COLUMNS}, ?1 FROM grumbles WHERE expires_at <= ?1"
                    ),
                    params![now],
                )?;
                let deleted =
                    tx.execute("DELETE FROM grumbles WHERE expires_at <= ?1", params![now])?;
                Ok(deleted)
            })
        })
        .await
    }

    async fn find_purification_candidates(
        &self,
        threshold: Option<i64>,
    ) -> AppResult<Vec<Grumble>> {
        db::with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GRUMBLE_COLUMNS} FROM grumbles g
                 WHERE g.is_purified = 0
                   AND g.vibe_count >= COALESCE(?1, g.purified_threshold)
                 ORDER BY g.posted_at DESC"
            ))?;
            let grumbles = stmt
                .query_map(params![threshold], map_grumble)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(grumbles)
        })
        .await
    }

    async fn find_archived_timeline(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
        page: Page,
    ) -> AppResult<Vec<ArchivedGrumble>> {
        filter.validate()?;
        let filter = TimelineFilter {
            exclude_expired: false,
            ..filter.clone()
        };
        let posted = self.posted_range(date);

        db::with_conn(&self.pool, move |conn| {
            query_timeline(
                conn,
                "grumbles_archive",
                ", g.archived_at",
                &filter,
                posted,
                page,
                map_archived_row,
            )
        })
        .await
    }

    async fn count_archived_timeline(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
    ) -> AppResult<i64> {
        filter.validate()?;
        let filter = TimelineFilter {
            exclude_expired: false,
            ..filter.clone()
        };
        let posted = self.posted_range(date);

        db::with_conn(&self.pool, move |conn| {
            count_rows(conn, "grumbles_archive", &filter, posted)
        })
        .await
    }

    async fn archived_timeline_with_total(
        &self,
        filter: &TimelineFilter,
        date: NaiveDate,
        page: Page,
    ) -> AppResult<(Vec<ArchivedGrumble>, i64)> {
        filter.validate()?;
        let filter = TimelineFilter {
            exclude_expired: false,
            ..filter.clone()
        };
        let posted = self.posted_range(date);

        db::with_conn(&self.pool, move |conn| {
            let tx = conn.transaction()?;
            let grumbles = query_timeline(
                &tx,
                "grumbles_archive",
                ", g.archived_at",
                &filter,
                posted,
                page,
                map_archived_row,
            )?;
            let total = count_rows(&tx, "grumbles_archive", &filter, posted)?;
            tx.commit()?;
            Ok((grumbles, total))
        })
        .await
    }

    async fn stats(&self, buckets: &[StatsBucket]) -> AppResult<Vec<StatsRow>> {
        let buckets = buckets.to_vec();
        db::with_conn(&self.pool, move |conn| query_stats(conn, &buckets, false, None)).await
    }

    async fn stats_by_toxic(
        &self,
        buckets: &[StatsBucket],
        level: Option<ToxicLevel>,
    ) -> AppResult<Vec<StatsRow>> {
        let buckets = buckets.to_vec();
        db::with_conn(&self.pool, move |conn| query_stats(conn, &buckets, true, level)).await
    }
}
