//! Tool surface exposed to the model.
//!
//! Twelve named tools, each with an OpenAI-compatible JSON-Schema input
//! definition. `definitions()` feeds `LlmRequest.tools`; `dispatch()` routes
//! a resolved `ToolCall` to the browser action library, the page extractor,
//! or one of the two loop-control tools (`ask_user`, `done`) the agent loop
//! itself intercepts before dispatch ever sees them.

use chromiumoxide::page::Page;
use serde_json::{json, Value};

use crate::browser::{actions, extract};

pub const NAVIGATE: &str = "navigate";
pub const CLICK: &str = "click";
pub const TYPE: &str = "type";
pub const SCROLL: &str = "scroll";
pub const READ_PAGE: &str = "read_page";
pub const GO_BACK: &str = "go_back";
pub const SELECT_OPTION: &str = "select_option";
pub const PRESS_KEY: &str = "press_key";
pub const HOVER: &str = "hover";
pub const WAIT: &str = "wait";
pub const ASK_USER: &str = "ask_user";
pub const DONE: &str = "done";

/// The tool definitions passed to the LLM on every turn, in the order a
/// model is most likely to reach for them.
pub fn definitions() -> Vec<crate::llm::ToolDefinition> {
    vec![
        def(
            NAVIGATE,
            "Navigate the browser to a URL. Adds https:// automatically if no scheme is given.",
            json!({
                "type": "object",
                "properties": { "url": { "type": "string", "description": "The URL to navigate to." } },
                "required": ["url"]
            }),
        ),
        def(
            CLICK,
            "Click an element identified by an ARIA selector, e.g. `button \"Submit\"`. Never use accessibility-tree paths like `ROOT > GENERIC > BUTTON`.",
            selector_schema(),
        ),
        def(
            TYPE,
            "Type text into an input or textarea identified by an ARIA selector.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "ARIA selector, e.g. `textbox \"Email\"`." },
                    "text": { "type": "string" }
                },
                "required": ["selector", "text"]
            }),
        ),
        def(
            SCROLL,
            "Scroll the page up or down by one screenful.",
            json!({
                "type": "object",
                "properties": { "direction": { "type": "string", "enum": ["up", "down"] } },
                "required": ["direction"]
            }),
        ),
        def(READ_PAGE, "Re-read the current page's accessibility tree without taking any action.", json!({"type": "object", "properties": {}})),
        def(GO_BACK, "Navigate back to the previous page in history.", json!({"type": "object", "properties": {}})),
        def(
            SELECT_OPTION,
            "Select an option in a dropdown, by its value or visible label.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string" },
                    "value": { "type": "string", "description": "The option's value attribute or visible label." }
                },
                "required": ["selector", "value"]
            }),
        ),
        def(
            PRESS_KEY,
            "Press a single keyboard key, e.g. `Enter` or `Escape`.",
            json!({
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }),
        ),
        def(HOVER, "Hover over an element identified by an ARIA selector.", selector_schema()),
        def(
            WAIT,
            "Pause for a number of milliseconds (capped at 10000) to let dynamic content settle.",
            json!({
                "type": "object",
                "properties": { "ms": { "type": "integer", "minimum": 0 } },
                "required": ["ms"]
            }),
        ),
        def(
            ASK_USER,
            "Ask the human operator a clarifying question and wait for their answer before continuing.",
            json!({
                "type": "object",
                "properties": { "question": { "type": "string" } },
                "required": ["question"]
            }),
        ),
        def(
            DONE,
            "Signal that the task is complete (or cannot be completed) and provide a final summary.",
            json!({
                "type": "object",
                "properties": { "summary": { "type": "string" } },
                "required": ["summary"]
            }),
        ),
    ]
}

fn selector_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selector": { "type": "string", "description": "ARIA selector, e.g. `button \"Submit\"` or `link \"Home\"`." }
        },
        "required": ["selector"]
    })
}

fn def(name: &str, description: &str, input_schema: Value) -> crate::llm::ToolDefinition {
    crate::llm::ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Dispatch a resolved browser tool call to the action library or the
/// extractor. Callers route `ask_user`/`done` themselves before reaching
/// here since those don't touch the page. Always returns a human-readable
/// result string; malformed arguments are reported back rather than
/// panicking.
pub async fn dispatch(page: &Page, tool_name: &str, arguments: &Value) -> String {
    match tool_name {
        NAVIGATE => match str_arg(arguments, "url") {
            Ok(url) => actions::navigate(page, url).await,
            Err(e) => e,
        },
        CLICK => match str_arg(arguments, "selector") {
            Ok(selector) => actions::click(page, selector).await,
            Err(e) => e,
        },
        TYPE => match (str_arg(arguments, "selector"), str_arg(arguments, "text")) {
            (Ok(selector), Ok(text)) => actions::type_text(page, selector, text).await,
            (Err(e), _) | (_, Err(e)) => e,
        },
        SCROLL => match str_arg(arguments, "direction") {
            Ok(direction) => actions::scroll(page, direction).await,
            Err(e) => e,
        },
        READ_PAGE => extract(page, crate::browser::DEFAULT_TOKEN_BUDGET).await,
        GO_BACK => actions::go_back(page).await,
        SELECT_OPTION => match (str_arg(arguments, "selector"), str_arg(arguments, "value")) {
            (Ok(selector), Ok(value)) => actions::select_option(page, selector, value).await,
            (Err(e), _) | (_, Err(e)) => e,
        },
        PRESS_KEY => match str_arg(arguments, "key") {
            Ok(key) => actions::press_key(page, key).await,
            Err(e) => e,
        },
        HOVER => match str_arg(arguments, "selector") {
            Ok(selector) => actions::hover(page, selector).await,
            Err(e) => e,
        },
        WAIT => match arguments.get("ms").and_then(Value::as_u64) {
            Some(ms) => actions::wait(ms).await,
            None => "Missing or invalid \"ms\" argument.".to_string(),
        },
        other => format!("Unknown tool \"{other}\"."),
    }
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing or invalid \"{key}\" argument."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_cover_the_full_tool_surface() {
        let names: Vec<&str> = definitions().iter().map(|d| d.name.as_str()).collect();
        for expected in [NAVIGATE, CLICK, TYPE, SCROLL, READ_PAGE, GO_BACK, SELECT_OPTION, PRESS_KEY, HOVER, WAIT, ASK_USER, DONE] {
            assert!(names.contains(&expected), "missing tool definition: {expected}");
        }
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn str_arg_reports_missing_key() {
        let args = json!({"selector": "button \"Go\""});
        assert_eq!(str_arg(&args, "selector").unwrap(), "button \"Go\"");
        assert!(str_arg(&args, "text").is_err());
    }
}
