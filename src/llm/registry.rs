//! Provider selection from environment configuration

use super::models::Provider;
use super::openai::OpenAiCompatService;
use super::{LlmError, LlmService, LoggingService};
use std::sync::Arc;

const GLM_BASE_URL: &str = "https://api.z.ai/api/paas/v4/chat/completions";
const GLM_DEFAULT_MODEL: &str = "glm-4.6";
const GLM_TEMPERATURE: f32 = 0.3;
const GLM_CONTEXT_WINDOW: usize = 128_000;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENAI_CONTEXT_WINDOW: usize = 128_000;

/// Configuration for the single active LLM provider.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub glm_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub glm_model: Option<String>,
    pub openai_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("LLM_PROVIDER").ok(),
            glm_api_key: std::env::var("GLM_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            glm_model: std::env::var("GLM_MODEL").ok(),
            openai_model: std::env::var("OPENAI_MODEL").ok(),
        }
    }

    fn provider(&self) -> Result<Provider, LlmError> {
        match &self.provider {
            None => Ok(Provider::Glm),
            Some(raw) => Provider::from_env_value(raw)
                .ok_or_else(|| LlmError::invalid_request(format!("unknown LLM_PROVIDER '{raw}', expected glm, openai or claude"))),
        }
    }
}

/// Builds the single active `LlmService` for a run.
///
/// Unlike a multi-model chat UI's registry, the agent only ever needs one
/// provider per process: the one named by `LLM_PROVIDER`. Constructing the
/// wrong or unconfigured provider fails loudly at startup rather than
/// silently falling back, per the "claude reserved" contract.
pub struct ModelRegistry {
    service: Arc<dyn LlmService>,
    provider: Provider,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = config.provider()?;

        let service: Arc<dyn LlmService> = match provider {
            Provider::Glm => {
                let api_key = config
                    .glm_api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| LlmError::auth("GLM_API_KEY is required when LLM_PROVIDER=glm"))?;
                let model = config.glm_model.clone().unwrap_or_else(|| GLM_DEFAULT_MODEL.to_string());
                Arc::new(OpenAiCompatService::new(
                    api_key,
                    GLM_BASE_URL,
                    model,
                    Some(GLM_TEMPERATURE),
                    GLM_CONTEXT_WINDOW,
                ))
            }
            Provider::OpenAi => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| LlmError::auth("OPENAI_API_KEY is required when LLM_PROVIDER=openai"))?;
                let model = config.openai_model.clone().unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
                Arc::new(OpenAiCompatService::new(api_key, OPENAI_BASE_URL, model, None, OPENAI_CONTEXT_WINDOW))
            }
            Provider::Claude => {
                return Err(LlmError::invalid_request(
                    "LLM_PROVIDER=claude is reserved and not yet implemented; use glm or openai",
                ));
            }
        };

        Ok(Self {
            service: Arc::new(LoggingService::new(service)),
            provider,
        })
    }

    pub fn service(&self) -> Arc<dyn LlmService> {
        self.service.clone()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_glm_and_requires_its_key() {
        let config = LlmConfig::default();
        let err = ModelRegistry::new(&config).unwrap_err();
        assert_eq!(err.kind, super::super::LlmErrorKind::Auth);
    }

    #[test]
    fn glm_with_key_succeeds() {
        let config = LlmConfig {
            glm_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config).unwrap();
        assert_eq!(registry.provider(), Provider::Glm);
        assert_eq!(registry.service().model_id(), GLM_DEFAULT_MODEL);
    }

    #[test]
    fn openai_requires_its_own_key() {
        let config = LlmConfig {
            provider: Some("openai".to_string()),
            glm_api_key: Some("unrelated".to_string()),
            ..Default::default()
        };
        let err = ModelRegistry::new(&config).unwrap_err();
        assert_eq!(err.kind, super::super::LlmErrorKind::Auth);
    }

    #[test]
    fn openai_with_key_succeeds() {
        let config = LlmConfig {
            provider: Some("openai".to_string()),
            openai_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config).unwrap();
        assert_eq!(registry.provider(), Provider::OpenAi);
    }

    #[test]
    fn claude_is_reserved() {
        let config = LlmConfig {
            provider: Some("claude".to_string()),
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let err = ModelRegistry::new(&config).unwrap_err();
        assert_eq!(err.kind, super::super::LlmErrorKind::InvalidRequest);
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = LlmConfig {
            provider: Some("bedrock".to_string()),
            ..Default::default()
        };
        assert!(ModelRegistry::new(&config).is_err());
    }
}
