//! Model-based evaluation through an external judgment service.
//!
//! [`ModelEvaluator`] owns the prompt contract and response parsing. The HTTP
//! transport sits behind [`JudgmentClient`] so tests can substitute a canned
//! client.

use crate::config::JudgmentConfig;
use crate::email::EmailRecord;
use crate::error::EvaluationError;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("scam-detector/", env!("CARGO_PKG_VERSION"));

/// Judgment returned by the model for one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub scam_score: u8,
    pub is_scam: bool,
    pub red_flags: Vec<String>,
    pub explanation: String,
}

/// Anything that can produce a [`ModelResult`] for an email.
#[async_trait]
pub trait ScamEvaluator: Send + Sync {
    async fn evaluate(&self, email: &EmailRecord) -> Result<ModelResult, EvaluationError>;
}

/// Raw text completion from the judgment service.
#[async_trait]
pub trait JudgmentClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, EvaluationError>;
}

pub struct ModelEvaluator {
    client: Arc<dyn JudgmentClient>,
    scam_threshold: u32,
}

impl ModelEvaluator {
    pub fn new(client: Arc<dyn JudgmentClient>, scam_threshold: u32) -> Self {
        Self {
            client,
            scam_threshold,
        }
    }

    pub fn build_prompt(&self, email: &EmailRecord) -> String {
        build_prompt(
            &email.subject,
            &email.sender,
            &email.body,
            self.scam_threshold,
        )
    }
}

#[async_trait]
impl ScamEvaluator for ModelEvaluator {
    async fn evaluate(&self, email: &EmailRecord) -> Result<ModelResult, EvaluationError> {
        let prompt = self.build_prompt(email);
        let completion = self.client.complete(&prompt).await?;
        log::debug!("Judgment service returned {} bytes", completion.len());
        parse_response(&completion)
    }
}

pub fn build_prompt(subject: &str, sender: &str, body: &str, scam_threshold: u32) -> String {
    format!(
        "Analyze this email for scam/phishing indicators:

SUBJECT: {subject}
FROM: {sender}
BODY: {body}

Evaluate for common scam indicators:
- Urgency/pressure tactics
- Requests for personal/financial info
- Suspicious links or attachments mentioned
- Grammar/spelling errors
- Sender legitimacy
- Too good to be true sounding offers
- Impersonation attempts

Return your analysis as JSON with:
- scam_score: 0-100 (0=definitely legitimate, 100=definitely scam)
- is_scam: true/false (true if score > {scam_threshold})
- red_flags: list of specific concerns found
- explanation: brief summary

Return ONLY the JSON, no other text."
    )
}

/// Removes an optional Markdown code fence (```` ``` ```` or ```` ```json ````)
/// around the completion.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[derive(Deserialize)]
struct RawModelResult {
    scam_score: f64,
    is_scam: bool,
    red_flags: Vec<String>,
    explanation: String,
}

pub fn parse_response(completion: &str) -> Result<ModelResult, EvaluationError> {
    let json = strip_code_fences(completion);
    let raw: RawModelResult = serde_json::from_str(json)
        .map_err(|e| EvaluationError::ModelResponseMalformed(e.to_string()))?;

    if !raw.scam_score.is_finite() || !(0.0..=100.0).contains(&raw.scam_score) {
        return Err(EvaluationError::ModelResponseMalformed(format!(
            "scam_score {} outside 0-100",
            raw.scam_score
        )));
    }

    Ok(ModelResult {
        scam_score: raw.scam_score.round() as u8,
        is_scam: raw.is_scam,
        red_flags: raw.red_flags,
        explanation: raw.explanation,
    })
}

/// Client for an Anthropic-style Messages endpoint.
pub struct AnthropicClient {
    http_client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    anthropic_version: String,
    api_key: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(config: &JudgmentConfig, api_key: String) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            anthropic_version: config.anthropic_version.clone(),
            api_key,
        })
    }

    /// Reads the API key from the variable named by `api_key_env`.
    pub fn from_env(config: &JudgmentConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!(
                "Environment variable {} is not set; it must hold the judgment service API key",
                config.api_key_env
            )
        })?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl JudgmentClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, EvaluationError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        log::debug!("Calling judgment service {} ({})", self.endpoint, self.model);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.anthropic_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| EvaluationError::ModelCallFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EvaluationError::ModelCallFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| EvaluationError::ModelCallFailed(format!("Unreadable response: {e}")))?;

        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                EvaluationError::ModelCallFailed("Response contained no text content".to_string())
            })
    }
}
