// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::{self, encode_time, time_column};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;
use crate::user::domain::{AnonymousUser, UserId};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &AnonymousUser) -> AppResult<()>;

    async fn find_by_id(&self, id: &UserId) -> AppResult<AnonymousUser>;

    /// Writes `profile_title` and `virtue_points`; the latter may only grow.
    async fn update(&self, user: &AnonymousUser) -> AppResult<()>;

    async fn find_top_by_virtue_points(&self, limit: i64) -> AppResult<Vec<AnonymousUser>>;

    /// Atomic `+points`, returns the new total
    async fn increment_virtue_points(&self, id: &UserId, points: i64) -> AppResult<i64>;
}

pub type DynUserRepository = Arc<dyn UserRepository>;

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "user_id, virtue_points, created_at, profile_title";

fn map_user(row: &Row<'_>) -> rusqlite::Result<AnonymousUser> {
    Ok(AnonymousUser {
        user_id: UserId::new(row.get::<_, String>(0)?),
        virtue_points: row.get(1)?,
        created_at: time_column(row, 2)?,
        profile_title: row.get(3)?,
    })
}

/// Single-statement increment, usable inside a larger transaction.
pub(crate) fn increment_virtue_points_on(
    conn: &Connection,
    id: &UserId,
    points: i64,
) -> AppResult<i64> {
    conn.query_row(
        "UPDATE anonymous_users
         SET virtue_points = virtue_points + ?2
         WHERE user_id = ?1
         RETURNING virtue_points",
        params![id.as_str(), points],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("User", id.as_str()))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &AnonymousUser) -> AppResult<()> {
        user.validate()?;
        let user = user.clone();

        db::with_conn(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO anonymous_users (user_id, virtue_points, created_at, profile_title)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.user_id.as_str(),
                    user.virtue_points,
                    encode_time(&user.created_at),
                    user.profile_title
                ],
            )
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    AppError::validation("user_id", "user already exists")
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &UserId) -> AppResult<AnonymousUser> {
        let id = id.clone();

        db::with_conn(&self.pool, move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM anonymous_users WHERE user_id = ?1"),
                params![id.as_str()],
                map_user,
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("User", id.as_str()))
        })
        .await
    }

    async fn update(&self, user: &AnonymousUser) -> AppResult<()> {
        user.validate()?;
        let user = user.clone();

        db::with_conn(&self.pool, move |conn| {
            let rows = conn.execute(
                "UPDATE anonymous_users
                 SET virtue_points = MAX(virtue_points, ?2), profile_title = ?3
                 WHERE user_id = ?1",
                params![user.user_id.as_str(), user.virtue_points, user.profile_title],
            )?;
            if rows == 0 {
                return Err(AppError::not_found("User", user.user_id.as_str()));
            }
            Ok(())
        })
        .await
    }

    async fn find_top_by_virtue_points(&self, limit: i64) -> AppResult<Vec<AnonymousUser>> {
        db::with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM anonymous_users
                 ORDER BY virtue_points DESC, created_at ASC
                 LIMIT ?1"
            ))?;
            let users = stmt
                .query_map(params![limit], map_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }

    async fn increment_virtue_points(&self, id: &UserId, points: i64) -> AppResult<i64> {
        if points < 0 {
            return Err(AppError::validation(
                "virtue_points",
                "virtue points cannot be decreased",
            ));
        }
        let id = id.clone();
        db::with_conn(&self.pool, move |conn| {
            increment_virtue_points_on(conn, &id, points)
        })
        .await
    }
}
