// Content moderation collaborators for new grumbles
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ModerationConfig;
use crate::error::{AppError, AppResult};

const MODERATION_PROMPT: &str = r#"Review the post below and answer with JSON only.

Mark it inappropriate if it contains any of:
1. Harassment, slander or personal attacks
2. Discrimination (race, gender, religion, nationality, disability, ...)
3. Personal information (names, addresses, phone numbers, email addresses, ...)
4. Encouragement of crime or self-harm

Reply format:
{"is_appropriate": true or false, "reason": "short reason"}

Post:
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub is_appropriate: bool,
    pub reason: String,
}

#[async_trait]
pub trait ContentFilter: Send + Sync {
    async fn filter_content(&self, text: &str) -> AppResult<ModerationResult>;
}

pub type DynContentFilter = Arc<dyn ContentFilter>;

/// Accepts everything. Used when no moderation backend is configured.
pub struct AllowAllFilter;

#[async_trait]
impl ContentFilter for AllowAllFilter {
    async fn filter_content(&self, _text: &str) -> AppResult<ModerationResult> {
        Ok(ModerationResult {
            is_appropriate: true,
            reason: "moderation_skipped".to_string(),
        })
    }
}

pub struct GeminiContentFilter {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiContentFilter {
    pub fn new(config: &ModerationConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl ContentFilter for GeminiContentFilter {
    async fn filter_content(&self, text: &str) -> AppResult<ModerationResult> {
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{MODERATION_PROMPT}{text}") }] }]
        });

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("moderation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "moderation backend returned {status}"
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("moderation response unreadable: {e}")))?;

        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        parse_moderation_reply(&text)
    }
}

/// Accepts a bare JSON object, optionally wrapped in a markdown code fence.
pub fn parse_moderation_reply(raw: &str) -> AppResult<ModerationResult> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Internal("empty moderation reply".to_string()));
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced).trim();

    let result: ModerationResult = serde_json::from_str(unfenced).map_err(|e| {
        AppError::Internal(format!("unparsable moderation reply {unfenced:?}: {e}"))
    })?;
    if result.reason.trim().is_empty() {
        return Err(AppError::Internal(format!(
            "moderation reply without reason: {unfenced:?}"
        )));
    }
    Ok(result)
}

/// Gemini when an API key is configured, otherwise allow-all.
pub fn from_config(config: &ModerationConfig) -> anyhow::Result<DynContentFilter> {
    match config
        .gemini_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        Some(key) => {
            tracing::info!("Content moderation via {}", config.gemini_model);
            Ok(Arc::new(GeminiContentFilter::new(config, key.to_string())?))
        }
        None => {
            tracing::warn!("No moderation API key configured; all posts are accepted");
            Ok(Arc::new(AllowAllFilter))
        }
    }
}
