use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::cookie_value;
use crate::state::AppState;
use crate::user::UserId;

/// One year; the cookie is the device's only identity.
const IDENTITY_MAX_AGE_SECS: u64 = 365 * 24 * 3600;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/auth/anonymous", post(anonymous))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnonymousAuthRequest {
    pub user_id: Option<String>,
}

fn identity_cookie(name: &str, user_id: &UserId) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, user_id, IDENTITY_MAX_AGE_SECS
    )
}

/// Body id, then header, then cookie; a fresh id when the device has none.
async fn anonymous(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<AnonymousAuthRequest>>,
) -> AppResult<Response> {
    let auth = &state.config.auth;
    let raw = body
        .and_then(|Json(b)| b.user_id)
        .or_else(|| {
            headers
                .get(auth.header_name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| cookie_value(&headers, &auth.cookie_name).map(str::to_string))
        .unwrap_or_else(|| UserId::generate().to_string());

    let outcome = state.services.users.authenticate(&raw, Utc::now()).await?;
    let status = if outcome.is_new_user {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let cookie = identity_cookie(&auth.cookie_name, &outcome.profile.user_id);

    Ok((status, [(header::SET_COOKIE, cookie)], Json(outcome)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_carries_identity() {
        let id = UserId::new("6f9619ff-8b86-d011-b42d-00c04fc964ff");
        let cookie = identity_cookie("grumble_uid", &id);
        assert!(cookie.starts_with("grumble_uid=6f9619ff-8b86-d011-b42d-00c04fc964ff;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=31536000"));
    }
}
