use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::services::{FilterParams, PageRequest, PostGrumble, TimelinePage, TimelineQuery};
use crate::state::AppState;
use crate::user::UserId;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/grumbles", get(list).post(create))
}

/// Flat on purpose: `Query` cannot deserialize numbers through `flatten`.
#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
    pub toxic_level_min: Option<i64>,
    pub toxic_level_max: Option<i64>,
    pub is_purified: Option<bool>,
    pub user_id: Option<String>,
    pub page: Option<i64>,
    #[serde(alias = "page_size")]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGrumbleRequest {
    pub content: String,
    pub toxic_level: i64,
    pub purified_threshold: Option<i64>,
    #[serde(default)]
    pub is_event_grumble: bool,
}

async fn list(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<TimelineParams>,
) -> AppResult<Json<TimelinePage>> {
    let user_id = params.user_id.as_deref().map(UserId::parse).transpose()?;

    let query = TimelineQuery {
        filter: FilterParams {
            toxic_level_min: params.toxic_level_min,
            toxic_level_max: params.toxic_level_max,
            is_purified: params.is_purified,
        },
        user_id,
        viewer: viewer.map(|u| u.user_id),
        paging: PageRequest {
            page: params.page,
            page_size: params.limit,
            offset: params.offset,
        },
    };

    let page = state.services.grumbles.timeline(query, Utc::now()).await?;
    Ok(Json(page))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateGrumbleRequest>,
) -> AppResult<impl IntoResponse> {
    let grumble = state
        .services
        .grumbles
        .post(
            PostGrumble {
                user_id: user.user_id,
                content: req.content,
                toxic_level: req.toxic_level,
                purified_threshold: req.purified_threshold,
                is_event_grumble: req.is_event_grumble,
            },
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(grumble)))
}
