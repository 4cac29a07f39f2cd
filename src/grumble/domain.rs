// Grumble entity - pure, no side effects
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};
use crate::user::UserId;

use super::purify::PurifyPolicy;

pub const CONTENT_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrumbleId(pub String);

impl GrumbleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrumbleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Self-reported toxicity, always within 1..=5 once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ToxicLevel(u8);

impl ToxicLevel {
    pub const MIN: ToxicLevel = ToxicLevel(1);
    pub const MAX: ToxicLevel = ToxicLevel(5);

    pub fn new(level: i64) -> AppResult<Self> {
        if level < Self::MIN.0 as i64 || level > Self::MAX.0 as i64 {
            return Err(AppError::validation(
                "toxic_level",
                format!("toxic_level must be between {} and {}", Self::MIN.0, Self::MAX.0),
            ));
        }
        Ok(Self(level as u8))
    }

    pub fn get(self) -> i64 {
        self.0 as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grumble {
    pub grumble_id: GrumbleId,
    pub user_id: UserId,
    pub content: String,
    pub toxic_level: ToxicLevel,
    pub vibe_count: i64,
    pub purified_threshold: i64,
    pub is_purified: bool,
    pub posted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_event_grumble: bool,
    /// Set only when a timeline was read on behalf of a viewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_vibed: Option<bool>,
}

impl Grumble {
    pub fn validate(&self) -> AppResult<()> {
        let chars = self.content.chars().count();
        if chars == 0 {
            return Err(AppError::validation("content", "content cannot be empty"));
        }
        if chars > CONTENT_MAX_CHARS {
            return Err(AppError::validation(
                "content",
                format!("content must be {CONTENT_MAX_CHARS} characters or less"),
            ));
        }
        if self.purified_threshold < 1 {
            return Err(AppError::validation(
                "purified_threshold",
                "purified_threshold must be at least 1",
            ));
        }
        if self.vibe_count < 0 {
            return Err(AppError::validation(
                "vibe_count",
                "vibe_count cannot be negative",
            ));
        }
        if self.expires_at <= self.posted_at {
            return Err(AppError::validation(
                "expires_at",
                "expires_at must be after posted_at",
            ));
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Zero once expired
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    pub fn can_be_purified(&self, threshold: i64) -> bool {
        PurifyPolicy::should_purify(self.is_purified, self.vibe_count, threshold)
    }

    /// One-way transition.
    pub fn purify(&mut self) {
        self.is_purified = true;
    }
}

/// An expired grumble moved out of the live table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedGrumble {
    #[serde(flatten)]
    pub grumble: Grumble,
    pub archived_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn grumble_by(user_id: &UserId) -> Grumble {
        let posted_at = Utc.with_ymd_and_hms(2025, 11, 27, 3, 0, 0).unwrap();
        Grumble {
            grumble_id: GrumbleId::generate(),
            user_id: user_id.clone(),
            content: "the train was late again".to_string(),
            toxic_level: ToxicLevel::new(3).unwrap(),
            vibe_count: 0,
            purified_threshold: 3,
            is_purified: false,
            posted_at,
            expires_at: posted_at + Duration::hours(12),
            is_event_grumble: false,
            has_vibed: None,
        }
    }
}
