use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap};
use axum::http::request::Parts;
use chrono::Utc;

use crate::error::AppError;
use crate::state::AppState;
use crate::user::UserId;

/// Represents the caller's anonymous identity, provisioned on first sight.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub is_new_user: bool,
}

/// Extractor that requires an identity.
/// Returns 401 if neither the header nor the cookie carries a valid UUID.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = raw_identity(parts, state)
            .ok_or_else(|| AppError::Unauthorized("missing user identity".into()))?;

        match state.services.users.authenticate(raw, Utc::now()).await {
            Ok(outcome) => Ok(CurrentUser {
                user_id: outcome.profile.user_id,
                is_new_user: outcome.is_new_user,
            }),
            Err(AppError::Validation { .. }) => {
                Err(AppError::Unauthorized("invalid user identity".into()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Optional identity: `None` instead of 401 when absent or malformed.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Header first, then cookie.
fn raw_identity<'a>(parts: &'a Parts, state: &AppState) -> Option<&'a str> {
    parts
        .headers
        .get(state.config.auth.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| cookie_value(&parts.headers, &state.config.auth.cookie_name))
}

pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut builder = Request::builder().uri("/");
        for (k, v) in pairs {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0.headers
    }

    #[test]
    fn cookie_lookup_by_name() {
        let p = headers(&[("cookie", "theme=dark; grumble_uid=abc ; other=1")]);
        assert_eq!(cookie_value(&p, "grumble_uid"), Some("abc"));
        assert_eq!(cookie_value(&p, "missing"), None);

        let empty = headers(&[("cookie", "grumble_uid=")]);
        assert_eq!(cookie_value(&empty, "grumble_uid"), None);
    }
}
