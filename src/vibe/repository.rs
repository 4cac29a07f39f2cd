use async_trait::async_trait;
use rusqlite::{params, Row};
use std::sync::Arc;

use crate::db::{self, encode_time, time_column};
use crate::error::{AppError, AppResult};
use crate::grumble::repository::increment_vibe_count_on;
use crate::grumble::GrumbleId;
use crate::state::DbPool;
use crate::user::repository::increment_virtue_points_on;
use crate::user::UserId;

use super::domain::{NewVibe, Vibe, VibeCreated, VibeId, VibeType};

#[async_trait]
pub trait VibeRepository: Send + Sync {
    /// Inserts the vibe, bumps the grumble's count and the voter's virtue
    /// points, all in one transaction.
    async fn create(&self, vibe: &NewVibe) -> AppResult<VibeCreated>;

    async fn exists(&self, grumble_id: &GrumbleId, user_id: &UserId) -> AppResult<bool>;

    async fn count_by_grumble(&self, grumble_id: &GrumbleId) -> AppResult<i64>;

    /// Newest first.
    async fn find_by_user(&self, user_id: &UserId, limit: i64, offset: i64)
        -> AppResult<Vec<Vibe>>;
}

pub type DynVibeRepository = Arc<dyn VibeRepository>;

pub struct SqliteVibeRepository {
    pool: DbPool,
}

impl SqliteVibeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_vibe(row: &Row<'_>) -> rusqlite::Result<Vibe> {
    let raw_type: String = row.get(3)?;
    let vibe_type = raw_type.parse::<VibeType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Vibe {
        vibe_id: VibeId(row.get(0)?),
        grumble_id: GrumbleId::new(row.get::<_, String>(1)?),
        user_id: UserId::new(row.get::<_, String>(2)?),
        vibe_type,
        voted_at: time_column(row, 4)?,
    })
}

#[async_trait]
impl VibeRepository for SqliteVibeRepository {
    async fn create(&self, vibe: &NewVibe) -> AppResult<VibeCreated> {
        let v = vibe.clone();

        db::with_conn(&self.pool, move |conn| {
            db::immediate_transaction(conn, |tx| {
                tx.execute(
                    "INSERT INTO vibes (grumble_id, user_id, vibe_type, voted_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        v.grumble_id.as_str(),
                        v.user_id.as_str(),
                        v.vibe_type.as_str(),
                        encode_time(&v.voted_at)
                    ],
                )
                .map_err(|e| {
                    if db::is_unique_violation(&e) {
                        AppError::DuplicateVibe {
                            grumble_id: v.grumble_id.to_string(),
                            user_id: v.user_id.to_string(),
                        }
                    } else if db::is_foreign_key_violation(&e) {
                        AppError::not_found("User", v.user_id.as_str())
                    } else {
                        e.into()
                    }
                })?;
                let vibe_id = VibeId(tx.last_insert_rowid());

                let vibe_count = increment_vibe_count_on(tx, &v.grumble_id)?;
                let virtue_points = increment_virtue_points_on(tx, &v.user_id, 1)?;

                Ok(VibeCreated {
                    vibe: Vibe {
                        vibe_id,
                        grumble_id: v.grumble_id.clone(),
                        user_id: v.user_id.clone(),
                        vibe_type: v.vibe_type,
                        voted_at: v.voted_at,
                    },
                    vibe_count,
                    virtue_points,
                })
            })
        })
        .await
    }

    async fn exists(&self, grumble_id: &GrumbleId, user_id: &UserId) -> AppResult<bool> {
        let grumble_id = grumble_id.clone();
        let user_id = user_id.clone();

        db::with_conn(&self.pool, move |conn| {
            let exists = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM vibes WHERE grumble_id = ?1 AND user_id = ?2)",
                params![grumble_id.as_str(), user_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn count_by_grumble(&self, grumble_id: &GrumbleId) -> AppResult<i64> {
        let grumble_id = grumble_id.clone();

        db::with_conn(&self.pool, move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM vibes WHERE grumble_id = ?1",
                params![grumble_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn find_by_user(
        &self,
        user_id: &UserId,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Vibe>> {
        let user_id = user_id.clone();

        db::with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT vibe_id, grumble_id, user_id, vibe_type, voted_at
                 FROM vibes
                 WHERE user_id = ?1
                 ORDER BY voted_at DESC, vibe_id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let vibes = stmt
                .query_map(
                    params![user_id.as_str(), limit.max(0), offset.max(0)],
                    map_vibe,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(vibes)
        })
        .await
    }
}
