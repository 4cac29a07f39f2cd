pub mod auth;
pub mod events;
pub mod grumbles;
pub mod stats;
pub mod users;
pub mod vibes;

use axum::error_handling::HandleErrorLayer;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::{BoxError, Router};
use std::time::Duration;
use tower::timeout::error::Elapsed;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

/// Full HTTP surface with a request deadline, tracing and CORS applied.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state);
    let deadline = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(auth::router())
        .merge(grumbles::router())
        .merge(stats::router())
        .merge(vibes::router())
        .merge(events::router())
        .merge(users::router())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    request_failed(err, deadline)
                }))
                .timeout(deadline),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn request_failed(err: BoxError, deadline: Duration) -> AppError {
    if err.is::<Elapsed>() {
        tracing::warn!(deadline_secs = deadline.as_secs(), "Request timed out");
        AppError::Timeout(format!("request timed out after {}s", deadline.as_secs()))
    } else {
        AppError::Internal(format!("unhandled middleware error: {err}"))
    }
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    let mut allowed_headers = vec![CONTENT_TYPE, COOKIE];
    if let Ok(name) = HeaderName::from_bytes(state.config.auth.header_name.as_bytes()) {
        allowed_headers.push(name);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers)
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}
