use crate::config::PurificationConfig;
use crate::error::{AppError, AppResult};

/// Decides how many vibes a grumble needs and when it has had enough.
#[derive(Debug, Clone, Copy)]
pub struct PurifyPolicy {
    default_threshold: i64,
    min_threshold: i64,
    max_threshold: i64,
}

impl PurifyPolicy {
    pub fn new(default_threshold: i64, min_threshold: i64, max_threshold: i64) -> Self {
        Self {
            default_threshold,
            min_threshold,
            max_threshold,
        }
    }

    pub fn from_config(config: &PurificationConfig) -> Self {
        Self::new(
            config.threshold_default,
            config.threshold_min,
            config.threshold_max,
        )
    }

    /// Falls back to the default when no threshold was requested; rejects
    /// requested values outside `[min, max]`.
    pub fn resolve_threshold(&self, requested: Option<i64>) -> AppResult<i64> {
        match requested {
            None => Ok(self.default_threshold),
            Some(t) if t < self.min_threshold || t > self.max_threshold => {
                Err(AppError::validation(
                    "purified_threshold",
                    format!(
                        "purified_threshold must be between {} and {}",
                        self.min_threshold, self.max_threshold
                    ),
                ))
            }
            Some(t) => Ok(t),
        }
    }

    pub fn should_purify(is_purified: bool, vibe_count: i64, threshold: i64) -> bool {
        !is_purified && vibe_count >= threshold
    }
}

impl Default for PurifyPolicy {
    fn default() -> Self {
        Self::from_config(&PurificationConfig::default())
    }
}
