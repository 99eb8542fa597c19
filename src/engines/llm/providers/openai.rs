use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::engines::llm::types::{LLMRequest, LLMResponse, TokenUsage};
use crate::engines::llm::LLMProvider;
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};

/// OpenAI chat-completions adapter. Plain text responses only; the planner
/// handles JSON extraction itself.
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> OrchestratorResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            OrchestratorError::new(
                ErrorCode::ConfigError,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                "invalid OpenAI API key format",
            )
        })?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                OrchestratorError::new(
                    ErrorCode::NetworkError,
                    ErrorCategory::LLM,
                    ErrorSeverity::High,
                    &format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_seconds: 60,
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: LLMRequest) -> OrchestratorResult<LLMResponse> {
        let body = OpenAIRequest {
            model: request.config.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.clone(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            temperature: request.config.temperature,
            max_tokens: request.config.max_tokens,
        };

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send();

        let response = timeout(Duration::from_secs(self.timeout_seconds), send)
            .await
            .map_err(|_| {
                OrchestratorError::new(
                    ErrorCode::Timeout,
                    ErrorCategory::LLM,
                    ErrorSeverity::High,
                    "OpenAI request timed out",
                )
            })?
            .map_err(|e| {
                OrchestratorError::new(
                    ErrorCode::NetworkError,
                    ErrorCategory::LLM,
                    ErrorSeverity::High,
                    &format!("OpenAI request failed: {}", e),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::new(
                ErrorCode::LLMApiError,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                &format!("OpenAI API error ({}): {}", status, detail),
            ));
        }

        let parsed: OpenAIResponse = response.json().await.map_err(|e| {
            OrchestratorError::new(
                ErrorCode::LLMInvalidResponse,
                ErrorCategory::LLM,
                ErrorSeverity::Medium,
                &format!("failed to decode OpenAI response: {}", e),
            )
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            OrchestratorError::new(
                ErrorCode::LLMInvalidResponse,
                ErrorCategory::LLM,
                ErrorSeverity::Medium,
                "OpenAI response contained no choices",
            )
        })?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            provider: "openai".to_string(),
            token_usage: parsed.usage.map(|u| TokenUsage {
                prompt: u.prompt_tokens,
                completion: u.completion_tokens,
                total: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}
