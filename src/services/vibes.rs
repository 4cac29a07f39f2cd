// Sending a vibe: the atomic ledger write plus the purification follow-up
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::grumble::{DynGrumbleRepository, GrumbleId, PurifyPolicy};
use crate::user::UserId;
use crate::vibe::{DynVibeRepository, NewVibe, Vibe, VibeType};

#[derive(Debug, Clone, Serialize)]
pub struct AddVibeResult {
    #[serde(flatten)]
    pub vibe: Vibe,
    pub vibe_count: i64,
    pub virtue_points: i64,
    pub is_purified: bool,
}

pub struct VibeService {
    grumbles: DynGrumbleRepository,
    vibes: DynVibeRepository,
}

impl VibeService {
    pub fn new(grumbles: DynGrumbleRepository, vibes: DynVibeRepository) -> Self {
        Self { grumbles, vibes }
    }

    pub async fn add_vibe(
        &self,
        grumble_id: &GrumbleId,
        user_id: &UserId,
        vibe_type: Option<VibeType>,
        now: DateTime<Utc>,
    ) -> AppResult<AddVibeResult> {
        let grumble = self.grumbles.find_by_id(grumble_id).await?;

        if grumble.is_purified {
            return Err(AppError::validation("grumble", "grumble already purified"));
        }
        if &grumble.user_id == user_id {
            return Err(AppError::validation(
                "grumble_id",
                "cannot vibe your own grumble",
            ));
        }
        // Fast path only; the unique index is what actually guards the pair
        if self.vibes.exists(grumble_id, user_id).await? {
            return Err(AppError::DuplicateVibe {
                grumble_id: grumble_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let created = self
            .vibes
            .create(&NewVibe {
                grumble_id: grumble_id.clone(),
                user_id: user_id.clone(),
                vibe_type: vibe_type.unwrap_or_default(),
                voted_at: now,
            })
            .await?;

        let mut is_purified = false;
        if PurifyPolicy::should_purify(false, created.vibe_count, grumble.purified_threshold) {
            match self.grumbles.mark_purified(grumble_id).await {
                Ok(transitioned) => {
                    if transitioned {
                        tracing::info!(
                            grumble_id = %grumble_id,
                            vibe_count = created.vibe_count,
                            "Grumble purified"
                        );
                    }
                    is_purified = true;
                }
                // The vibe stands; a later vibe retries the transition
                Err(e) => {
                    tracing::warn!(grumble_id = %grumble_id, error = %e, "Purification update failed");
                }
            }
        }

        Ok(AddVibeResult {
            vibe: created.vibe,
            vibe_count: created.vibe_count,
            virtue_points: created.virtue_points,
            is_purified,
        })
    }
}
