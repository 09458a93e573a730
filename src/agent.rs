//! Agent loop (C6)
//!
//! Ties together the context manager, security guard, tool dispatch, and
//! loop/degeneracy detection into the observe-think-act cycle that drives
//! one task to completion. Every failure mode below the loop itself is
//! non-fatal text; only a closed browser or runaway error rate aborts here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::Value;
use tokio::time::timeout;

use crate::browser::session::BrowserSession;
use crate::browser::extract;
use crate::context::{ContextManager, RecentActions, ToolCall as CtxToolCall};
use crate::llm::LlmService;
use crate::security::{PageContext, SecurityDecision, SecurityGuard};
use crate::system_prompt;
use crate::tools;

const MAX_CONSECUTIVE_FAILURES: usize = 3;
const MAX_TEXT_ONLY_RETRIES: usize = 2;
const TITLE_TIMEOUT: Duration = Duration::from_secs(5);

const COMPLETION_WORDS: &[&str] = &["task", "complete", "finished", "done"];

/// Human interaction boundary for `ask_user`. The CLI implements this over
/// stdin/stdout; tests inject a scripted responder.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    async fn ask(&self, question: &str) -> String;
}

pub struct Agent {
    llm: Arc<dyn LlmService>,
    security: SecurityGuard,
    user: Arc<dyn UserInteraction>,
    max_iterations: usize,
    token_budget: usize,
    observation_budget: usize,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmService>,
        security: SecurityGuard,
        user: Arc<dyn UserInteraction>,
        max_iterations: usize,
        token_budget: usize,
        observation_budget: usize,
    ) -> Self {
        Self {
            llm,
            security,
            user,
            max_iterations,
            token_budget,
            observation_budget,
        }
    }

    /// Run one task to completion (or to the iteration ceiling), returning
    /// a human-readable summary.
    pub async fn run(&self, browser: &mut BrowserSession, task: &str) -> String {
        let mut ctx = ContextManager::with_limits(task, 10, self.token_budget);
        let system_prompt = system_prompt::build(task);

        let mut consecutive_failures = 0usize;
        let mut text_only_retries = 0usize;
        let mut recent_actions = RecentActions::default();
        let mut summary: Option<String> = None;
        let mut is_done = false;

        for iteration in 1..=self.max_iterations {
            let page = match browser.active_page().await {
                Ok(p) => p,
                Err(_) => return "Task aborted: Browser windows closed.".to_string(),
            };

            let snapshot = extract(&page, self.observation_budget).await;
            let observation = format!("[Step {iteration}/{}]\n\nCurrent page state:\n{snapshot}", self.max_iterations);
            ctx.add_observation(observation);

            let request = ctx.build_request(system_prompt.clone(), tools::definitions(), None);
            let response = match self.llm.complete(&request).await {
                Ok(r) => r,
                Err(err) => {
                    tracing::error!(error = %err.message, "inference failed");
                    ctx.remove_last_observation();
                    consecutive_failures += 1;
                    if consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                        return "Too many consecutive errors.".to_string();
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let tool_uses = response.tool_uses();
            if !tool_uses.is_empty() {
                let text = { let t = response.text(); if t.is_empty() { None } else { Some(t) } };
                let ctx_tool_calls: Vec<CtxToolCall> = tool_uses
                    .iter()
                    .map(|(id, name, input)| CtxToolCall {
                        id: (*id).to_string(),
                        name: (*name).to_string(),
                        arguments_json: input.to_string(),
                    })
                    .collect();
                ctx.add_assistant_message(text, ctx_tool_calls.clone());

                let title = fetch_title(&page).await;

                for (call, (_, name, input)) in ctx_tool_calls.iter().zip(tool_uses.iter()) {
                    let descriptor = format!("{name}({input})");
                    let current_url = page.url().await.ok().flatten().unwrap_or_default();

                    if is_stuck(&recent_actions, &descriptor, &current_url) {
                        let msg = format!(
                            "You already tried \"{descriptor}\" at this URL and it didn't make progress. Try a different selector or approach instead of repeating it."
                        );
                        ctx.add_tool_result(call, &msg);
                        continue;
                    }

                    recent_actions.push(descriptor, current_url.clone());

                    let result = self.execute_tool_call(&page, name, input, &title, &current_url).await;
                    if *name == tools::DONE {
                        is_done = true;
                        summary = Some(extract_done_summary(input, &result));
                    }

                    ctx.add_tool_result(call, &result);

                    if is_done {
                        break;
                    }
                }

                if is_done {
                    break;
                }
            } else {
                let text = response.text();
                if text.is_empty() {
                    consecutive_failures += 1;
                    if consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                        return "Too many consecutive errors.".to_string();
                    }
                    continue;
                }

                ctx.add_assistant_message(Some(text.clone()), vec![]);

                match decide_text_only_response(&text, response.is_stop(), text_only_retries, MAX_TEXT_ONLY_RETRIES) {
                    TextOnlyDecision::Nudge => {
                        ctx.add_observation("Please continue the task using one of the available tools rather than a plain-text reply.");
                        text_only_retries += 1;
                        continue;
                    }
                    TextOnlyDecision::AcceptAsSummary => {
                        summary = Some(text);
                        is_done = true;
                        break;
                    }
                    TextOnlyDecision::GiveUpWithText => {
                        summary = Some(text);
                        break;
                    }
                }
            }
        }

        if !is_done {
            summary = Some(self.force_summary(&mut ctx, &system_prompt).await);
        }

        summary.unwrap_or_else(|| format!("Reached {} iterations without completing the task.", self.max_iterations))
    }

    async fn execute_tool_call(&self, page: &Page, name: &str, input: &Value, title: &str, url: &str) -> String {
        if name == tools::ASK_USER {
            let question = input.get("question").and_then(Value::as_str).unwrap_or("(no question given)");
            return self.user.ask(question).await;
        }
        if name == tools::DONE {
            return input.get("summary").and_then(Value::as_str).unwrap_or("Task completed.").to_string();
        }

        let page_ctx = PageContext { title, url };
        match self.security.check_action(name, &input.to_string(), &page_ctx).await {
            SecurityDecision::Blocked(msg) => msg,
            SecurityDecision::Allowed => tools::dispatch(page, name, input).await,
        }
    }

    /// One final inference with only `done` available, used when
    /// `max_iterations` elapses without the model calling it itself.
    async fn force_summary(&self, ctx: &mut ContextManager, system_prompt: &str) -> String {
        ctx.add_observation("You have reached the maximum number of allowed steps. Call `done` now with your best summary of what was accomplished so far.");

        let done_tool = tools::definitions().into_iter().find(|d| d.name == tools::DONE).expect("done is always defined");
        let request = ctx.build_request(system_prompt.to_string(), vec![done_tool], None);

        match self.llm.complete(&request).await {
            Ok(response) => {
                if let Some((_, _, input)) = response.tool_uses().into_iter().find(|(_, n, _)| *n == tools::DONE) {
                    input
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Reached {} iterations.", self.max_iterations))
                } else if !response.text().is_empty() {
                    response.text()
                } else {
                    format!("Reached {} iterations without an explicit summary.", self.max_iterations)
                }
            }
            Err(_) => format!("Reached {} iterations without an explicit summary.", self.max_iterations),
        }
    }
}

fn extract_done_summary(input: &Value, dispatched_result: &str) -> String {
    input.get("summary").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| dispatched_result.to_string())
}

fn contains_completion_word(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    COMPLETION_WORDS.iter().any(|w| lower.contains(w))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextOnlyDecision {
    /// Demand tool use and keep iterating; this turn produced no action.
    Nudge,
    /// Accept the text as the final task summary and end the run.
    AcceptAsSummary,
    /// Retries are exhausted; end the run with the text as-is.
    GiveUpWithText,
}

/// Decide what to do with a text-only (no tool calls) assistant turn,
/// following spec order: a question with retries remaining always gets
/// nudged first, *before* the stop+completion-word acceptance check; only
/// once nudging is no longer offered (no "?", or retries exhausted) does a
/// `stop` finish reason with a completion word end the run.
fn decide_text_only_response(text: &str, is_stop: bool, retries: usize, max_retries: usize) -> TextOnlyDecision {
    if text.contains('?') && retries < max_retries {
        return TextOnlyDecision::Nudge;
    }

    if is_stop && contains_completion_word(text) {
        return TextOnlyDecision::AcceptAsSummary;
    }

    if retries < max_retries {
        return TextOnlyDecision::Nudge;
    }

    TextOnlyDecision::GiveUpWithText
}

async fn fetch_title(page: &Page) -> String {
    match timeout(TITLE_TIMEOUT, page.get_title()).await {
        Ok(Ok(Some(title))) => title,
        _ => String::new(),
    }
}

/// Loop/degeneracy detection: exact repetition (the same action+url was
/// just tried twice in a row) or oscillation (the proposed URL has been
/// "visited" three or more times, counting only transitions into it, not
/// every entry recorded while already there).
fn is_stuck(recent: &RecentActions, proposed_desc: &str, proposed_url: &str) -> bool {
    let entries: Vec<_> = recent.iter().collect();
    let n = entries.len();

    if n >= 2 {
        let last = entries[n - 1];
        let second_last = entries[n - 2];
        if last.action_desc == proposed_desc && last.url == proposed_url && second_last.action_desc == proposed_desc && second_last.url == proposed_url {
            return true;
        }
    }

    let mut urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
    urls.push(proposed_url);

    let mut visits = 0;
    for (i, url) in urls.iter().enumerate() {
        if *url == proposed_url && (i == 0 || urls[i - 1] != proposed_url) {
            visits += 1;
        }
    }

    visits >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(actions: &mut RecentActions, desc: &str, url: &str) {
        actions.push(desc.to_string(), url.to_string());
    }

    #[test]
    fn exact_repetition_is_stuck_on_third_attempt() {
        let mut recent = RecentActions::default();
        push(&mut recent, "click(button \"Next\")", "https://a.example/p1");
        push(&mut recent, "click(button \"Next\")", "https://a.example/p1");
        assert!(is_stuck(&recent, "click(button \"Next\")", "https://a.example/p1"));
    }

    #[test]
    fn distinct_actions_are_not_stuck() {
        let mut recent = RecentActions::default();
        push(&mut recent, "click(button \"Next\")", "https://a.example/p1");
        push(&mut recent, "click(button \"Prev\")", "https://a.example/p1");
        assert!(!is_stuck(&recent, "click(button \"Next\")", "https://a.example/p1"));
    }

    #[test]
    fn oscillation_is_stuck_at_third_distinct_visit() {
        let mut recent = RecentActions::default();
        // visits: p1 (visit 1), p2, p1 (visit 2), p2
        push(&mut recent, "click(a)", "https://a.example/p1");
        push(&mut recent, "click(b)", "https://a.example/p2");
        push(&mut recent, "click(a)", "https://a.example/p1");
        push(&mut recent, "click(b)", "https://a.example/p2");
        // proposing to go back to p1 would be the third distinct visit
        assert!(is_stuck(&recent, "click(a)", "https://a.example/p1"));
    }

    #[test]
    fn repeated_clicks_on_one_page_are_not_oscillation() {
        // Clicking "next" repeatedly on a single-page email viewer never
        // changes the URL, so it should never look like oscillation.
        let mut recent = RecentActions::default();
        for _ in 0..5 {
            push(&mut recent, "click(next)", "https://mail.example.com/inbox");
        }
        // distinct desc each time avoids the exact-repetition path; url never changes.
        assert!(!is_stuck(&recent, "click(archive)", "https://mail.example.com/inbox"));
    }

    #[test]
    fn question_with_retries_left_is_nudged_even_if_it_also_sounds_done() {
        // "Is the task complete?" has a completion word AND ends in "?", with
        // a stop finish reason. The question must win: nudge, don't end the run.
        let decision = decide_text_only_response("Is the task complete?", true, 0, MAX_TEXT_ONLY_RETRIES);
        assert_eq!(decision, TextOnlyDecision::Nudge);
    }

    #[test]
    fn stop_with_completion_word_and_no_question_is_accepted() {
        let decision = decide_text_only_response("The task is now complete.", true, 0, MAX_TEXT_ONLY_RETRIES);
        assert_eq!(decision, TextOnlyDecision::AcceptAsSummary);
    }

    #[test]
    fn question_past_retry_cap_falls_through_to_completion_check() {
        let decision = decide_text_only_response("Is this done?", true, MAX_TEXT_ONLY_RETRIES, MAX_TEXT_ONLY_RETRIES);
        assert_eq!(decision, TextOnlyDecision::AcceptAsSummary);
    }

    #[test]
    fn non_stop_plain_text_with_retries_left_is_nudged() {
        let decision = decide_text_only_response("Still working on it.", false, 0, MAX_TEXT_ONLY_RETRIES);
        assert_eq!(decision, TextOnlyDecision::Nudge);
    }

    #[test]
    fn non_stop_plain_text_past_retry_cap_gives_up_with_text() {
        let decision = decide_text_only_response("Still working on it.", false, MAX_TEXT_ONLY_RETRIES, MAX_TEXT_ONLY_RETRIES);
        assert_eq!(decision, TextOnlyDecision::GiveUpWithText);
    }
}
