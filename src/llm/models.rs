//! LLM provider enumeration
//!
//! Unlike a multi-model chat UI, the agent talks to exactly one provider per
//! run, selected by `LLM_PROVIDER`. This module only carries the provider
//! identity and its associated environment variable / defaults.

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Glm,
    OpenAi,
    /// Reserved: accepted as a config value but not yet implemented.
    Claude,
}

impl Provider {
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "glm" => Some(Provider::Glm),
            "openai" => Some(Provider::OpenAi),
            "claude" => Some(Provider::Claude),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Glm => "GLM",
            Provider::OpenAi => "OpenAI",
            Provider::Claude => "Claude",
        }
    }

    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Glm => "GLM_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Claude => "ANTHROPIC_API_KEY",
        }
    }
}
