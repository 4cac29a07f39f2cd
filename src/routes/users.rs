use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::services::{Profile, RankingEntry};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(me))
        .route("/api/users/rankings", get(rankings))
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingParams {
    pub limit: Option<i64>,
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Profile>> {
    Ok(Json(state.services.users.profile(&user.user_id).await?))
}

async fn rankings(
    State(state): State<AppState>,
    Query(params): Query<RankingParams>,
) -> AppResult<Json<Vec<RankingEntry>>> {
    Ok(Json(state.services.users.rankings(params.limit).await?))
}
