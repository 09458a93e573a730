//! Environment-driven configuration for everything outside the LLM
//! provider selection (which lives in `llm::LlmConfig`, since that's where
//! the provider-specific defaults already are).

use std::path::PathBuf;

use crate::browser::extractor::DEFAULT_TOKEN_BUDGET as DEFAULT_OBSERVATION_BUDGET;

const DEFAULT_MAX_ITERATIONS: usize = 50;
const DEFAULT_TOKEN_BUDGET: usize = 8000;
const DEFAULT_USER_DATA_DIR: &str = "./.wayfarer/profile";

/// Runtime configuration read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_iterations: usize,
    pub user_data_dir: PathBuf,
    pub token_budget: usize,
    pub observation_budget: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            max_iterations: parse_env("MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS),
            user_data_dir: std::env::var("WAYFARER_USER_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_USER_DATA_DIR)),
            token_budget: parse_env("WAYFARER_TOKEN_BUDGET", DEFAULT_TOKEN_BUDGET),
            observation_budget: parse_env("WAYFARER_OBSERVATION_BUDGET", DEFAULT_OBSERVATION_BUDGET),
        }
    }
}

fn parse_env(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Initializes the `tracing` subscriber from `RUST_LOG`, defaulting to
/// `wayfarer=info`.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wayfarer=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_on_unset_or_invalid() {
        assert_eq!(parse_env("WAYFARER_TEST_NONEXISTENT_KEY", 42), 42);
    }
}
