// Anonymous identities and the virtue ledger
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};

pub const PROFILE_TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh device identity for callers that have none yet.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accepts only UUID-shaped identities, normalized to lowercase hyphenated form.
    pub fn parse(raw: &str) -> AppResult<Self> {
        uuid::Uuid::parse_str(raw.trim())
            .map(|u| Self(u.hyphenated().to_string()))
            .map_err(|_| AppError::validation("user_id", "user_id must be a valid UUID"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label derived from virtue points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VirtueRank {
    None,
    Minarai,
    Miroku,
    Jizo,
    Daibosatsu,
}

impl VirtueRank {
    pub fn from_points(points: i64) -> Self {
        match points {
            p if p >= 40 => Self::Daibosatsu,
            p if p >= 30 => Self::Jizo,
            p if p >= 20 => Self::Miroku,
            p if p >= 10 => Self::Minarai,
            _ => Self::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Minarai => "見習い行者",
            Self::Miroku => "弥勒",
            Self::Jizo => "地蔵",
            Self::Daibosatsu => "大菩薩",
        }
    }
}

impl Serialize for VirtueRank {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnonymousUser {
    pub user_id: UserId,
    pub virtue_points: i64,
    pub created_at: DateTime<Utc>,
    pub profile_title: Option<String>,
}

impl AnonymousUser {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            virtue_points: 0,
            created_at: now,
            profile_title: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.user_id.as_str().is_empty() {
            return Err(AppError::validation("user_id", "user_id cannot be empty"));
        }
        if self.virtue_points < 0 {
            return Err(AppError::validation(
                "virtue_points",
                "virtue_points cannot be negative",
            ));
        }
        if let Some(title) = &self.profile_title {
            check_title(title)?;
        }
        Ok(())
    }

    pub fn rank(&self) -> VirtueRank {
        VirtueRank::from_points(self.virtue_points)
    }

    /// Points only ever grow; negative grants are ignored.
    pub fn increment_virtue_points(&mut self, points: i64) {
        if points > 0 {
            self.virtue_points += points;
        }
    }

    pub fn update_title(&mut self, title: impl Into<String>) -> AppResult<()> {
        let title = title.into();
        check_title(&title)?;
        self.profile_title = Some(title);
        Ok(())
    }
}

fn check_title(title: &str) -> AppResult<()> {
    if title.chars().count() > PROFILE_TITLE_MAX_CHARS {
        return Err(AppError::validation(
            "profile_title",
            format!("profile_title must be {PROFILE_TITLE_MAX_CHARS} characters or less"),
        ));
    }
    Ok(())
}
