pub mod providers;
pub mod types;

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, OrchestratorError, OrchestratorResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use types::{LLMRequest, LLMResponse};

/// Main LLM handler interface for provider abstraction.
#[async_trait]
pub trait LLMHandlerInterface: Send + Sync {
    /// Complete a conversation with the requested (or default) provider.
    async fn complete(&self, request: LLMRequest) -> OrchestratorResult<LLMResponse>;
}

/// A single LLM provider backend.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: LLMRequest) -> OrchestratorResult<LLMResponse>;
}

/// Provider registry that routes completion requests.
pub struct LLMHandler {
    providers: RwLock<HashMap<String, Arc<dyn LLMProvider>>>,
    default_provider: RwLock<Option<String>>,
}

impl LLMHandler {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            default_provider: RwLock::new(None),
        }
    }

    /// Build a handler from the environment. Registers the OpenAI provider
    /// when `OPENAI_API_KEY` is set.
    pub fn from_env() -> OrchestratorResult<Self> {
        let handler = Self::new();
        match std::env::var("OPENAI_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => {
                let provider = providers::openai::OpenAIProvider::new(api_key)?;
                handler.register_provider(Arc::new(provider));
                Ok(handler)
            }
            _ => Err(OrchestratorError::new(
                ErrorCode::ConfigError,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                "OPENAI_API_KEY is required in the environment",
            )),
        }
    }

    /// Register a provider; the first registration becomes the default.
    pub fn register_provider(&self, provider: Arc<dyn LLMProvider>) {
        let name = provider.name().to_lowercase();
        {
            let mut providers = self.providers.write().expect("provider lock poisoned");
            providers.insert(name.clone(), provider);
        }
        let mut default = self.default_provider.write().expect("provider lock poisoned");
        if default.is_none() {
            *default = Some(name);
        }
    }

    fn resolve_provider(&self, requested: Option<&str>) -> OrchestratorResult<Arc<dyn LLMProvider>> {
        let name = requested
            .map(|s| s.to_lowercase())
            .or_else(|| {
                self.default_provider
                    .read()
                    .expect("provider lock poisoned")
                    .clone()
            })
            .ok_or_else(|| {
                OrchestratorError::new(
                    ErrorCode::LLMProviderNotFound,
                    ErrorCategory::LLM,
                    ErrorSeverity::High,
                    "no provider specified and no default provider registered",
                )
            })?;

        let providers = self.providers.read().expect("provider lock poisoned");
        providers.get(&name).cloned().ok_or_else(|| {
            OrchestratorError::new(
                ErrorCode::LLMProviderNotFound,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                &format!("provider '{}' not registered", name),
            )
        })
    }
}

impl Default for LLMHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMHandlerInterface for LLMHandler {
    async fn complete(&self, request: LLMRequest) -> OrchestratorResult<LLMResponse> {
        let provider = self.resolve_provider(request.provider.as_deref())?;
        tracing::debug!(provider = provider.name(), messages = request.messages.len(), "dispatching LLM request");
        provider.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::types::{LLMConfig, LLMMessage};
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: LLMRequest) -> OrchestratorResult<LLMResponse> {
            Ok(LLMResponse {
                content: request.messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                model: request.config.model,
                provider: "echo".to_string(),
                token_usage: None,
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn complete_without_providers_fails() {
        let handler = LLMHandler::new();
        let err = handler
            .complete(LLMRequest {
                messages: vec![LLMMessage::user("hi")],
                provider: None,
                config: LLMConfig::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::LLMProviderNotFound);
    }

    #[tokio::test]
    async fn first_registered_provider_becomes_default() {
        let handler = LLMHandler::new();
        handler.register_provider(Arc::new(EchoProvider));
        let response = handler
            .complete(LLMRequest {
                messages: vec![LLMMessage::user("ping")],
                provider: None,
                config: LLMConfig::default(),
            })
            .await
            .unwrap();
        assert_eq!(response.content, "ping");
        assert_eq!(response.provider, "echo");
    }
}
