use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RankingsConfig;
use crate::error::{AppError, AppResult};
use crate::user::{AnonymousUser, DynUserRepository, UserId, VirtueRank};

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub virtue_points: i64,
    pub rank: VirtueRank,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_title: Option<String>,
}

impl From<AnonymousUser> for Profile {
    fn from(user: AnonymousUser) -> Self {
        Self {
            rank: user.rank(),
            user_id: user.user_id,
            virtue_points: user.virtue_points,
            created_at: user.created_at,
            profile_title: user.profile_title,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    pub user_id: UserId,
    pub virtue_points: i64,
    pub rank: VirtueRank,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    #[serde(flatten)]
    pub profile: Profile,
    pub is_new_user: bool,
}

pub struct UserService {
    users: DynUserRepository,
    rankings: RankingsConfig,
}

impl UserService {
    pub fn new(users: DynUserRepository, rankings: RankingsConfig) -> Self {
        Self { users, rankings }
    }

    /// Returns the user behind `raw_id`, creating it on first sight.
    pub async fn authenticate(&self, raw_id: &str, now: DateTime<Utc>) -> AppResult<AuthOutcome> {
        let user_id = UserId::parse(raw_id)?;

        match self.users.find_by_id(&user_id).await {
            Ok(user) => {
                return Ok(AuthOutcome {
                    profile: user.into(),
                    is_new_user: false,
                })
            }
            Err(AppError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let user = AnonymousUser::new(user_id, now);
        match self.users.create(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.user_id, "New anonymous user");
                Ok(AuthOutcome {
                    profile: user.into(),
                    is_new_user: true,
                })
            }
            // Lost a race with a concurrent first request from the same device
            Err(AppError::Validation { .. }) => Ok(AuthOutcome {
                profile: self.users.find_by_id(&user.user_id).await?.into(),
                is_new_user: false,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn profile(&self, user_id: &UserId) -> AppResult<Profile> {
        Ok(self.users.find_by_id(user_id).await?.into())
    }

    /// Missing or zero limit means the default; anything else must be in range.
    pub fn resolve_limit(&self, limit: Option<i64>) -> AppResult<i64> {
        match limit {
            None | Some(0) => Ok(self.rankings.limit_default),
            Some(l) if l < self.rankings.limit_min || l > self.rankings.limit_max => {
                Err(AppError::validation(
                    "limit",
                    format!(
                        "limit must be between {} and {}",
                        self.rankings.limit_min, self.rankings.limit_max
                    ),
                ))
            }
            Some(l) => Ok(l),
        }
    }

    pub async fn rankings(&self, limit: Option<i64>) -> AppResult<Vec<RankingEntry>> {
        let limit = self.resolve_limit(limit)?;
        let users = self.users.find_top_by_virtue_points(limit).await?;
        Ok(users
            .into_iter()
            .map(|u| RankingEntry {
                rank: u.rank(),
                user_id: u.user_id,
                virtue_points: u.virtue_points,
                created_at: u.created_at,
            })
            .collect())
    }
}
