use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::services::{EventGrumbles, EventGrumblesQuery, FilterParams, PageRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/event-grumbles", get(list))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    pub toxic_level_min: Option<i64>,
    pub toxic_level_max: Option<i64>,
    pub is_purified: Option<bool>,
    pub page: Option<i64>,
    #[serde(alias = "page_size")]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<EventParams>,
) -> AppResult<Json<EventGrumbles>> {
    let query = EventGrumblesQuery {
        filter: FilterParams {
            toxic_level_min: params.toxic_level_min,
            toxic_level_max: params.toxic_level_max,
            is_purified: params.is_purified,
        },
        viewer: viewer.map(|u| u.user_id),
        paging: PageRequest {
            page: params.page,
            page_size: params.limit,
            offset: params.offset,
        },
    };

    Ok(Json(state.services.events.get(query, Utc::now()).await?))
}
