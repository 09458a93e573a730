//! Interactive CLI: reads one task per line from stdin, runs the agent,
//! prints its summary, and repeats until the user quits.

use std::io::{self, Write};

use async_trait::async_trait;

use crate::agent::UserInteraction;
use crate::security::ConfirmPrompt;

const BANNER: &str = r"
Wayfarer - an LLM-driven browser automation agent.
Type a task and press Enter. Type an empty line, \"quit\" or \"exit\" to stop.
";
const SEPARATOR: &str = "--------------------------------------------------------------------------------";

/// Reads confirmation prompts and clarifying questions from stdin/stdout.
/// Shared by both `ConfirmPrompt` (security guard) and `UserInteraction`
/// (the `ask_user` tool) since both boil down to "print a prompt, read a
/// line".
pub struct StdioPrompt;

impl StdioPrompt {
    async fn prompt_for_line(prompt: String) -> String {
        tokio::task::spawn_blocking(move || {
            print!("{prompt}");
            let _ = io::stdout().flush();
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(_) => line.trim().to_string(),
                Err(_) => String::new(),
            }
        })
        .await
        .unwrap_or_default()
    }
}

#[async_trait]
impl ConfirmPrompt for StdioPrompt {
    async fn confirm(&self, prompt: &str) -> String {
        Self::prompt_for_line(format!("{prompt}\n> ")).await
    }
}

#[async_trait]
impl UserInteraction for StdioPrompt {
    async fn ask(&self, question: &str) -> String {
        Self::prompt_for_line(format!("\nThe agent is asking: {question}\n> ")).await
    }
}

/// Read one line of input, returning `None` when the user wants to quit
/// (empty line, `quit`, or `exit`, or end of input).
async fn read_task_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        print!("\ntask> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return None; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
    .await
    .unwrap_or(None)
}

/// The interactive prompt/read/run/print loop. Returns an exit code (0
/// clean, 1 unrecoverable).
pub async fn run_repl(agent: &crate::agent::Agent, browser: &mut crate::browser::BrowserSession) -> i32 {
    println!("{BANNER}");

    loop {
        let Some(task) = read_task_line().await else {
            println!("Goodbye.");
            return 0;
        };

        println!("{SEPARATOR}");
        let summary = agent.run(browser, &task).await;
        println!("{SEPARATOR}");
        println!("{summary}");
    }
}
