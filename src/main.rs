//! Wayfarer - an LLM-driven browser automation agent.
//!
//! Drives a real, visible browser through an observe-think-act loop,
//! reading one task at a time from an interactive CLI.

mod agent;
mod browser;
mod config;
mod context;
mod llm;
mod security;
mod system_prompt;
mod tools;

mod cli;

use std::sync::Arc;

use agent::Agent;
use browser::BrowserSession;
use cli::StdioPrompt;
use config::Config;
use llm::{LlmConfig, ModelRegistry};
use security::SecurityGuard;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    config::init_logging();

    let config = Config::from_env();
    let llm_config = LlmConfig::from_env();

    let registry = match ModelRegistry::new(&llm_config) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to initialize LLM provider: {}", err.message);
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(provider = ?registry.provider(), model = %registry.service().model_id(), "LLM provider ready");

    let mut browser = match BrowserSession::launch(&config.user_data_dir).await {
        Ok(b) => b,
        Err(err) => {
            eprintln!("Failed to launch browser: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let prompt = Arc::new(StdioPrompt);
    let security = SecurityGuard::new(prompt.clone());
    let agent = Agent::new(
        registry.service(),
        security,
        prompt,
        config.max_iterations,
        config.token_budget,
        config.observation_budget,
    );

    let exit_code = cli::run_repl(&agent, &mut browser).await;

    let _ = browser.close().await;

    if exit_code == 0 {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    }
}
