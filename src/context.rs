//! Conversation context manager (C5)
//!
//! Maintains a linear message log plus an `ActionHistory` summary within a
//! token budget, and builds the windowed request sent to the LLM each turn.
//! The one invariant every method here must preserve is that a `ToolResult`
//! never appears in a window without the `Assistant` message whose
//! `ToolCalls` it answers — violating that gets the conversation rejected by
//! the LLM backend as an orphaned tool result.

use crate::llm::{ContentBlock, LlmMessage, LlmRequest, MessageRole, SystemContent, ToolDefinition};
use std::collections::VecDeque;

const DEFAULT_MAX_HISTORY_MESSAGES: usize = 10;
const DEFAULT_TOKEN_BUDGET: usize = 8000;
const RECENT_ACTIONS_CAPACITY: usize = 10;

/// A request by the model to invoke one named tool with JSON-encoded arguments.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

/// One entry in the linear conversation log.
#[derive(Debug, Clone)]
pub enum Message {
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

/// One bounded entry in the loop detector's ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentAction {
    pub action_desc: String,
    pub url: String,
}

/// Bounded ring (capacity 10) of recent `(actionDesc, url)` pairs.
#[derive(Debug, Clone, Default)]
pub struct RecentActions {
    entries: VecDeque<RecentAction>,
}

impl RecentActions {
    pub fn push(&mut self, action_desc: String, url: String) {
        if self.entries.len() >= RECENT_ACTIONS_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(RecentAction { action_desc, url });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentAction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Estimate token count for a content string: `ceil(len / 4)`.
pub fn estimate_tokens(s: &str) -> usize {
    s.len().div_ceil(4)
}

fn estimate_message_tokens(msg: &Message) -> usize {
    match msg {
        Message::User(text) => estimate_tokens(text),
        Message::Assistant { content, tool_calls } => {
            let mut total = content.as_deref().map(estimate_tokens).unwrap_or(0);
            for call in tool_calls {
                total += estimate_tokens(&call.arguments_json) + 10;
            }
            total
        }
        Message::ToolResult { content, .. } => estimate_tokens(content),
    }
}

/// Maintains the raw message log and its compressed `ActionHistory` summary.
pub struct ContextManager {
    task: String,
    messages: Vec<Message>,
    action_history: Vec<String>,
    max_history_messages: usize,
    token_budget: usize,
}

impl ContextManager {
    pub fn new(task: impl Into<String>) -> Self {
        Self::with_limits(task, DEFAULT_MAX_HISTORY_MESSAGES, DEFAULT_TOKEN_BUDGET)
    }

    pub fn with_limits(task: impl Into<String>, max_history_messages: usize, token_budget: usize) -> Self {
        Self {
            task: task.into(),
            messages: Vec::new(),
            action_history: Vec::new(),
            max_history_messages,
            token_budget,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Append a User observation, then compress the raw log if it now
    /// exceeds the token budget. `ActionHistory` already preserves the gist
    /// of anything dropped.
    pub fn add_observation(&mut self, text: impl Into<String>) {
        self.messages.push(Message::User(text.into()));
        self.compress_if_over_budget();
    }

    pub fn add_assistant_message(&mut self, content: Option<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(Message::Assistant { content, tool_calls });
    }

    /// Append a `ToolResult` and push a compact `ActionHistory` entry:
    /// `"name(k1=v1,k2=v2,...) -> <prefix>"`. Prefix is 300 chars when the
    /// result is longer than 1000 chars, otherwise 100.
    pub fn add_tool_result(&mut self, call: &ToolCall, result: &str) {
        self.messages.push(Message::ToolResult {
            tool_call_id: call.id.clone(),
            content: result.to_string(),
        });

        let prefix_len = if result.len() > 1000 { 300 } else { 100 };
        let prefix = truncate_chars(result, prefix_len);
        let args = format_args_compact(&call.arguments_json);
        self.action_history.push(format!("{}({args}) -> {prefix}", call.name));
    }

    /// Remove the most recently added User message, scanning backward. Used
    /// when an iteration fails after adding an observation but before the
    /// inference call succeeded, to avoid a dangling unanswered User turn.
    pub fn remove_last_observation(&mut self) {
        if let Some(pos) = self.messages.iter().rposition(|m| matches!(m, Message::User(_))) {
            self.messages.remove(pos);
        }
    }

    pub fn action_history(&self) -> &[String] {
        &self.action_history
    }

    /// The window start index: the later of `len - maxHistoryMessages` and
    /// the first non-`ToolResult` message, found by walking backward from
    /// the naive target past any `ToolResult`s to the `Assistant` that owns
    /// them.
    fn window_start(&self) -> usize {
        let len = self.messages.len();
        let mut start = len.saturating_sub(self.max_history_messages);
        while start > 0 && matches!(self.messages.get(start), Some(Message::ToolResult { .. })) {
            start -= 1;
        }
        start
    }

    fn compress_if_over_budget(&mut self) {
        let total: usize = self.messages.iter().map(estimate_message_tokens).sum();
        if total <= self.token_budget {
            return;
        }
        // Drop from the front down to a safe boundary that keeps any
        // surviving ToolResult paired with its owning Assistant message.
        let mut cut = self.messages.len().saturating_sub(self.max_history_messages.max(1));
        while cut > 0 && matches!(self.messages.get(cut), Some(Message::ToolResult { .. })) {
            cut -= 1;
        }
        if cut > 0 {
            self.messages.drain(0..cut);
        }
    }

    /// Build the full LLM request: system prompt, optional ActionHistory
    /// summary, then the windowed raw messages.
    pub fn build_request(&self, system_prompt: String, tools: Vec<ToolDefinition>, max_tokens: Option<u32>) -> LlmRequest {
        let mut messages = Vec::new();

        if !self.action_history.is_empty() {
            let summary = format!("Actions taken so far:\n{}", self.action_history.join("\n"));
            messages.push(LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::text(summary)],
            });
        }

        let start = self.window_start();
        for msg in &self.messages[start..] {
            messages.push(to_wire_message(msg));
        }

        LlmRequest {
            system: vec![SystemContent::new(system_prompt)],
            messages,
            tools,
            max_tokens,
        }
    }
}

fn to_wire_message(msg: &Message) -> LlmMessage {
    match msg {
        Message::User(text) => LlmMessage {
            role: MessageRole::User,
            content: vec![ContentBlock::text(text.clone())],
        },
        Message::Assistant { content, tool_calls } => {
            let mut blocks = Vec::new();
            if let Some(text) = content {
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(text.clone()));
                }
            }
            for call in tool_calls {
                let input = serde_json::from_str(&call.arguments_json).unwrap_or_else(|_| serde_json::json!({}));
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input,
                });
            }
            LlmMessage {
                role: MessageRole::Assistant,
                content: blocks,
            }
        }
        Message::ToolResult { tool_call_id, content } => LlmMessage {
            role: MessageRole::Tool,
            content: vec![ContentBlock::tool_result(tool_call_id.clone(), content.clone(), false)],
        },
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Render a JSON arguments object as `k1=v1,k2=v2,...` for the compact
/// `ActionHistory` entry. Falls back to the raw JSON text if it isn't an
/// object (or fails to parse).
fn format_args_compact(arguments_json: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments_json) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", value_to_compact_string(v)))
            .collect::<Vec<_>>()
            .join(","),
        _ => arguments_json.to_string(),
    }
}

fn value_to_compact_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments_json: args.to_string(),
        }
    }

    #[test]
    fn window_walks_back_past_orphaned_tool_results() {
        let mut ctx = ContextManager::with_limits("task", 2, 8000);
        ctx.add_assistant_message(None, vec![call("1", "click", "{}")]);
        ctx.add_tool_result(&call("1", "click", "{}"), "clicked");
        ctx.add_observation("next page");

        // max_history_messages=2 would naively start at the ToolResult,
        // orphaning it from its owning Assistant message.
        let request = ctx.build_request("system".to_string(), vec![], None);
        assert_eq!(request.messages[0].role, MessageRole::Assistant);
    }

    #[test]
    fn add_tool_result_uses_short_prefix_for_short_results() {
        let mut ctx = ContextManager::new("task");
        ctx.add_tool_result(&call("1", "navigate", "{\"url\":\"example.com\"}"), "Navigated to https://example.com");
        assert_eq!(ctx.action_history().len(), 1);
        assert!(ctx.action_history()[0].starts_with("navigate(url=example.com) -> Navigated"));
    }

    #[test]
    fn add_tool_result_uses_long_prefix_for_long_results() {
        let mut ctx = ContextManager::new("task");
        let long_result = "x".repeat(2000);
        ctx.add_tool_result(&call("1", "read_page", "{}"), &long_result);
        let entry = &ctx.action_history()[0];
        // "read_page() -> " + 300 chars
        assert_eq!(entry.len(), "read_page() -> ".len() + 300);
    }

    #[test]
    fn remove_last_observation_removes_most_recent_user_message() {
        let mut ctx = ContextManager::new("task");
        ctx.add_observation("first");
        ctx.add_assistant_message(Some("thinking".to_string()), vec![]);
        ctx.add_observation("second");
        assert_eq!(ctx.message_count(), 3);

        ctx.remove_last_observation();
        assert_eq!(ctx.message_count(), 2);
        assert!(matches!(ctx.messages.last(), Some(Message::Assistant { .. })));
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
