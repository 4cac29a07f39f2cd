use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::grumble::{Granularity, StatsRow};
use crate::services::StatsQuery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/grumbles/stats", get(totals))
        .route("/api/grumbles/stats/toxic", get(by_toxic))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub granularity: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub tz: Option<String>,
    pub toxic_level: Option<i64>,
}

fn instant(field: &str, raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| AppError::validation(field, format!("{field} must be an RFC 3339 timestamp")))
    })
    .transpose()
}

impl StatsParams {
    fn to_query(&self) -> AppResult<StatsQuery> {
        let granularity = self
            .granularity
            .as_deref()
            .unwrap_or_default()
            .parse::<Granularity>()?;
        Ok(StatsQuery {
            granularity,
            from: instant("from", self.from.as_deref())?,
            to: instant("to", self.to.as_deref())?,
            tz: self.tz.clone(),
        })
    }
}

async fn totals(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> AppResult<Json<Vec<StatsRow>>> {
    let query = params.to_query()?;
    Ok(Json(state.services.stats.stats(&query, Utc::now()).await?))
}

async fn by_toxic(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> AppResult<Json<Vec<StatsRow>>> {
    let query = params.to_query()?;
    let rows = state
        .services
        .stats
        .stats_by_toxic(&query, params.toxic_level, Utc::now())
        .await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_require_granularity_and_valid_instants() {
        let missing = StatsParams::default();
        assert!(matches!(missing.to_query(), Err(AppError::Validation { ref field, .. }) if field == "granularity"));

        let bad_from = StatsParams {
            granularity: Some("day".into()),
            from: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(bad_from.to_query(), Err(AppError::Validation { ref field, .. }) if field == "from"));

        let ok = StatsParams {
            granularity: Some("month".into()),
            from: Some("2025-11-01T00:00:00Z".into()),
            to: Some("2025-12-01T00:00:00+09:00".into()),
            ..Default::default()
        };
        let query = ok.to_query().unwrap();
        assert_eq!(query.granularity, Granularity::Month);
        assert_eq!(query.to.unwrap().to_rfc3339(), "2025-11-30T15:00:00+00:00");
    }
}
