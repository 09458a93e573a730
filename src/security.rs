//! Security guard (C4)
//!
//! Classifies proposed tool calls as safe or potentially destructive and
//! gates the destructive ones behind a human confirmation. Meta-tools that
//! can only read or pace the page are auto-approved without ever invoking
//! the confirm callback.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// Tools that can never cause an irreversible side effect on their own.
const META_TOOLS: &[&str] = &["read_page", "scroll", "wait", "ask_user", "done", "hover", "go_back", "navigate"];

/// Per-tool regex triggers, checked against the tool's raw arguments JSON.
static CLICK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(delete|pay|submit|buy|confirm|удалить|оплатить|отправить|купить|подтвердить)\b").unwrap()
});
static PRESS_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\benter\b").unwrap());

/// Broader keyword list checked against tool arguments for any tool, and
/// against page context for `click` (only when the page itself signals a
/// checkout/cart/deletion/confirmation surface).
static KEYWORD_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(delete|pay|submit|buy|order|cancel|unsubscribe|transfer|sign|agree|reset|удалить|оплатить|отправить|купить|заказать|отменить|отписаться|перевести|подписать|согласиться|сбросить)\b",
    )
    .unwrap()
});

/// Page-context signal that this is the kind of surface (checkout, cart,
/// deletion, confirmation) where a `click` keyword match should also be
/// tested against the page title/URL, not just the arguments.
static PAGE_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(checkout|cart|delete|confirm|оплата|корзина|удал|подтвержд)").unwrap()
});

/// The page the proposed action would run against.
pub struct PageContext<'a> {
    pub title: &'a str,
    pub url: &'a str,
}

/// Outcome of a security check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDecision {
    Allowed,
    /// Non-fatal: carries the tool-result text to hand back to the LLM.
    Blocked(String),
}

/// Injected human-in-the-loop confirmation boundary. The CLI implements
/// this over stdin; tests inject a scripted responder.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Returns the raw answer text; an answer beginning with "y"
    /// (case-insensitive) grants approval.
    async fn confirm(&self, prompt: &str) -> String;
}

pub struct SecurityGuard {
    confirm: Arc<dyn ConfirmPrompt>,
}

impl SecurityGuard {
    pub fn new(confirm: Arc<dyn ConfirmPrompt>) -> Self {
        Self { confirm }
    }

    pub async fn check_action(&self, tool_name: &str, arguments_json: &str, page: &PageContext<'_>) -> SecurityDecision {
        if META_TOOLS.contains(&tool_name) {
            return SecurityDecision::Allowed;
        }

        if !Self::is_destructive(tool_name, arguments_json, page) {
            return SecurityDecision::Allowed;
        }

        let prompt = format!(
            "The agent wants to run `{tool_name}` with arguments {arguments_json} on page \"{}\" ({}).\nThis looks like it could have a real-world effect. Allow it? (y/n) ",
            page.title, page.url
        );
        let answer = self.confirm.confirm(&prompt).await;
        if answer.trim().to_ascii_lowercase().starts_with('y') {
            SecurityDecision::Allowed
        } else {
            SecurityDecision::Blocked(format!(
                "Action blocked: `{tool_name}` was flagged as potentially destructive and the user did not approve it. Try a different approach, or use ask_user to check with the user directly."
            ))
        }
    }

    fn is_destructive(tool_name: &str, arguments_json: &str, page: &PageContext<'_>) -> bool {
        match tool_name {
            "click" if CLICK_PATTERN.is_match(arguments_json) => return true,
            "press_key" if PRESS_KEY_PATTERN.is_match(arguments_json) => return true,
            _ => {}
        }

        if KEYWORD_LIST.is_match(arguments_json) {
            return true;
        }

        if tool_name == "click" {
            let page_is_sensitive = PAGE_SIGNAL.is_match(page.title) || PAGE_SIGNAL.is_match(page.url);
            if page_is_sensitive && KEYWORD_LIST.is_match(page.title) {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedConfirm {
        answer: Mutex<String>,
        invoked: Mutex<bool>,
    }

    impl ScriptedConfirm {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(answer.to_string()),
                invoked: Mutex::new(false),
            })
        }

        fn was_invoked(&self) -> bool {
            *self.invoked.lock().unwrap()
        }
    }

    #[async_trait]
    impl ConfirmPrompt for ScriptedConfirm {
        async fn confirm(&self, _prompt: &str) -> String {
            *self.invoked.lock().unwrap() = true;
            self.answer.lock().unwrap().clone()
        }
    }

    fn page<'a>(title: &'a str, url: &'a str) -> PageContext<'a> {
        PageContext { title, url }
    }

    #[tokio::test]
    async fn meta_tools_are_allowed_without_confirmation() {
        let confirm = ScriptedConfirm::new("n");
        let guard = SecurityGuard::new(confirm.clone());
        for tool in META_TOOLS {
            let decision = guard.check_action(tool, "{}", &page("Example", "https://example.com")).await;
            assert_eq!(decision, SecurityDecision::Allowed);
        }
        assert!(!confirm.was_invoked());
    }

    #[tokio::test]
    async fn destructive_click_denied_is_blocked() {
        let confirm = ScriptedConfirm::new("n");
        let guard = SecurityGuard::new(confirm.clone());
        let decision = guard
            .check_action(
                "click",
                "{\"selector\":\"button \\\"Оплатить\\\"\"}",
                &page("Checkout - my-shop.ru", "https://my-shop.ru/checkout"),
            )
            .await;
        assert!(matches!(decision, SecurityDecision::Blocked(_)));
        assert!(confirm.was_invoked());
    }

    #[tokio::test]
    async fn destructive_click_approved_is_allowed() {
        let confirm = ScriptedConfirm::new("yes");
        let guard = SecurityGuard::new(confirm);
        let decision = guard
            .check_action("click", "{\"selector\":\"button \\\"Delete\\\"\"}", &page("Inbox", "https://mail.example.com"))
            .await;
        assert_eq!(decision, SecurityDecision::Allowed);
    }

    #[tokio::test]
    async fn harmless_click_is_allowed_without_confirmation() {
        let confirm = ScriptedConfirm::new("n");
        let guard = SecurityGuard::new(confirm.clone());
        let decision = guard
            .check_action("click", "{\"selector\":\"button \\\"Next\\\"\"}", &page("Inbox", "https://mail.example.com"))
            .await;
        assert_eq!(decision, SecurityDecision::Allowed);
        assert!(!confirm.was_invoked());
    }
}
