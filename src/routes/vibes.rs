use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::grumble::GrumbleId;
use crate::state::AppState;
use crate::vibe::VibeType;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/grumbles/{id}/vibes", post(add_vibe))
}

#[derive(Debug, Default, Deserialize)]
pub struct AddVibeRequest {
    #[serde(alias = "vibe_type")]
    pub r#type: Option<String>,
}

async fn add_vibe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<AddVibeRequest>>,
) -> AppResult<impl IntoResponse> {
    let vibe_type = body
        .and_then(|Json(b)| b.r#type)
        .map(|t| t.parse::<VibeType>())
        .transpose()?;

    let result = state
        .services
        .vibes
        .add_vibe(&GrumbleId::new(id), &user.user_id, vibe_type, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}
