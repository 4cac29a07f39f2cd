use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::db::encode_time;
use crate::error::{AppError, AppResult};
use crate::user::UserId;

use super::domain::ToxicLevel;

/// Predicates shared by the page query and the count query.
///
/// Every dimension is optional; `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    pub toxic_level_min: Option<ToxicLevel>,
    pub toxic_level_max: Option<ToxicLevel>,
    pub is_purified: Option<bool>,
    /// Hide rows with `expires_at <= as_of`.
    pub exclude_expired: bool,
    pub as_of: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
    /// When set, each row carries whether this viewer already vibed it.
    pub viewer_user_id: Option<UserId>,
}

impl TimelineFilter {
    /// Live timeline at `now`.
    pub fn live(now: DateTime<Utc>) -> Self {
        Self {
            exclude_expired: true,
            as_of: Some(now),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if let (Some(min), Some(max)) = (self.toxic_level_min, self.toxic_level_max) {
            if min > max {
                return Err(AppError::validation(
                    "toxic_level_min",
                    "toxic_level_min cannot be greater than toxic_level_max",
                ));
            }
        }
        if self.exclude_expired && self.as_of.is_none() {
            return Err(AppError::Internal(
                "exclude_expired requires an as_of timestamp".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolved limit/offset. Built once per request so the page and the total
/// agree on the same slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }

    /// 1-based page number; anything below 1 is treated as the first page.
    pub fn from_page_number(page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        Self::new(page_size, (page - 1).saturating_mul(page_size))
    }

    /// 1-based page this slice falls on.
    pub fn number(&self) -> i64 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }
}

/// `WHERE` clause with positional parameters in textual order.
pub(crate) struct WhereClause {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Optional `[start, end)` constraint on `posted_at`, for day-scoped reads.
pub(crate) type PostedRange = Option<(DateTime<Utc>, DateTime<Utc>)>;

pub(crate) fn where_clause(filter: &TimelineFilter, posted: PostedRange) -> WhereClause {
    let mut conditions: Vec<&'static str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(min) = filter.toxic_level_min {
        conditions.push("g.toxic_level >= ?");
        params.push(Value::Integer(min.get()));
    }
    if let Some(max) = filter.toxic_level_max {
        conditions.push("g.toxic_level <= ?");
        params.push(Value::Integer(max.get()));
    }
    if let Some(purified) = filter.is_purified {
        conditions.push("g.is_purified = ?");
        params.push(Value::Integer(purified as i64));
    }
    if filter.exclude_expired {
        if let Some(as_of) = filter.as_of {
            conditions.push("g.expires_at > ?");
            params.push(Value::Text(encode_time(&as_of)));
        }
    }
    if let Some(user_id) = &filter.user_id {
        conditions.push("g.user_id = ?");
        params.push(Value::Text(user_id.as_str().to_string()));
    }
    if let Some((start, end)) = posted {
        conditions.push("g.posted_at >= ?");
        params.push(Value::Text(encode_time(&start)));
        conditions.push("g.posted_at < ?");
        params.push(Value::Text(encode_time(&end)));
    }

    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    WhereClause { sql, params }
}
