use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::grumble::GrumbleId;
use crate::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VibeId(pub i64);

impl fmt::Display for VibeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of empathy a reader can send. Only "わかる…" for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VibeType {
    #[default]
    #[serde(rename = "WAKARU")]
    Wakaru,
}

impl VibeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VibeType::Wakaru => "WAKARU",
        }
    }
}

impl fmt::Display for VibeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VibeType {
    type Err = AppError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAKARU" => Ok(VibeType::Wakaru),
            _ => Err(AppError::validation("vibe_type", "only WAKARU supported")),
        }
    }
}

/// A vibe about to be written; the id is assigned by storage.
#[derive(Debug, Clone)]
pub struct NewVibe {
    pub grumble_id: GrumbleId,
    pub user_id: UserId,
    pub vibe_type: VibeType,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vibe {
    pub vibe_id: VibeId,
    pub grumble_id: GrumbleId,
    pub user_id: UserId,
    pub vibe_type: VibeType,
    pub voted_at: DateTime<Utc>,
}

/// Counters as they stood when the vibe transaction committed.
#[derive(Debug, Clone, PartialEq)]
pub struct VibeCreated {
    pub vibe: Vibe,
    pub vibe_count: i64,
    pub virtue_points: i64,
}
