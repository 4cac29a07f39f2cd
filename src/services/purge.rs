use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::grumble::DynGrumbleRepository;

pub struct PurgeService {
    grumbles: DynGrumbleRepository,
}

impl PurgeService {
    pub fn new(grumbles: DynGrumbleRepository) -> Self {
        Self { grumbles }
    }

    /// Archives every grumble expired at `now`; returns how many moved.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        match self.grumbles.archive_expired(now).await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(count, "Archived expired grumbles");
                }
                Ok(count)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to archive expired grumbles");
                Err(e)
            }
        }
    }
}
