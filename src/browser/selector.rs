//! Selector resolver (C1)
//!
//! Pure, driver-free parsing of an LLM-authored selector string into a
//! `ParsedSelector`. Resolution against a live page happens one layer up in
//! `Locator` (see `browser/locator.rs`); this module has no dependency on
//! `chromiumoxide` so it can be tested without a browser.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// The closed set of recognized ARIA roles, compared case-insensitively.
pub const ARIA_ROLES: &[&str] = &[
    "alert",
    "alertdialog",
    "application",
    "article",
    "banner",
    "blockquote",
    "button",
    "caption",
    "cell",
    "checkbox",
    "code",
    "columnheader",
    "combobox",
    "complementary",
    "contentinfo",
    "definition",
    "deletion",
    "dialog",
    "directory",
    "document",
    "emphasis",
    "feed",
    "figure",
    "form",
    "generic",
    "grid",
    "gridcell",
    "group",
    "heading",
    "img",
    "insertion",
    "link",
    "list",
    "listbox",
    "listitem",
    "log",
    "main",
    "marquee",
    "math",
    "menu",
    "menubar",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "meter",
    "navigation",
    "none",
    "note",
    "option",
    "paragraph",
    "presentation",
    "progressbar",
    "radio",
    "radiogroup",
    "region",
    "row",
    "rowgroup",
    "rowheader",
    "scrollbar",
    "search",
    "searchbox",
    "separator",
    "slider",
    "spinbutton",
    "status",
    "strong",
    "subscript",
    "superscript",
    "switch",
    "tab",
    "table",
    "tablist",
    "tabpanel",
    "term",
    "textbox",
    "time",
    "timer",
    "toolbar",
    "tooltip",
    "tree",
    "treegrid",
    "treeitem",
];

pub fn is_recognized_role(role: &str) -> bool {
    ARIA_ROLES.iter().any(|r| r.eq_ignore_ascii_case(role))
}

/// A selector string resolved to a specific resolution strategy. Each
/// variant is opaque to the caller until bound to a live page by
/// `Locator::bind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSelector {
    /// `role1 "name1" role2 "name2"`: a child locator scoped inside a parent.
    NestedAria {
        parent_role: String,
        parent_name: String,
        child_role: String,
        child_name: String,
    },
    /// `role "name"`, with or without a trailing `[...]` suffix, or the
    /// unquoted `role name` form.
    Aria { role: String, name: String },
    /// `role=ROLE[name='...']`, name optional.
    Role { role: String, name: Option<String> },
    Text(String),
    Label(String),
    Placeholder(String),
    Css(String),
    /// Last resort: a non-exact visible-text match.
    FallbackText(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SelectorError(pub String);

static TREE_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]+\s*>\s*[A-Z]+.*\d").unwrap());
static NESTED_ARIA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(\w+)\s+"([^"]*)"\s+(\w+)\s+"([^"]*)"$"#).unwrap());
static ARIA_QUOTED_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^(\w+)\s+"([^"]*)"\s*(\[.*\])?$"#).unwrap());
static ARIA_UNQUOTED_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s+(.+)$").unwrap());
static ROLE_NAME_SUFFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[name=['\x22]([^'\x22]*)['\x22]\]").unwrap());

const CSS_SIGNAL_CHARS: &[char] = &['#', '.', '[', ']', '>', ':', '=', '@'];

/// Parse an LLM-authored selector string into a `ParsedSelector`, following
/// the eleven resolution rules in order (first match wins). Never retried
/// by this function itself; a failed resolution is propagated to the
/// caller as a descriptive error.
pub fn parse_selector(input: &str) -> Result<ParsedSelector, SelectorError> {
    // 1. Strip a leading "- " (tolerates YAML-list copy-paste).
    let s = input.strip_prefix("- ").unwrap_or(input).trim();

    // 2. Reject tree-path hallucinations.
    if s.to_ascii_lowercase().contains("root") {
        return Err(reject_tree_path(s));
    }
    if TREE_PATH_PATTERN.is_match(s) {
        return Err(reject_tree_path(s));
    }

    // 3. Nested ARIA scope.
    if let Some(caps) = NESTED_ARIA_PATTERN.captures(s) {
        let parent_role = caps[1].to_string();
        let child_role = caps[3].to_string();
        if is_recognized_role(&parent_role) && is_recognized_role(&child_role) {
            return Ok(ParsedSelector::NestedAria {
                parent_role,
                parent_name: caps[2].to_string(),
                child_role,
                child_name: caps[4].to_string(),
            });
        }
    }

    // 4. ARIA quoted.
    if let Some(caps) = ARIA_QUOTED_PATTERN.captures(s) {
        let role = caps[1].to_string();
        if is_recognized_role(&role) {
            return Ok(ParsedSelector::Aria {
                role,
                name: caps[2].to_string(),
            });
        }
    }

    // 5. ARIA unquoted: `role name`, no `=` in the name.
    if let Some(caps) = ARIA_UNQUOTED_PATTERN.captures(s) {
        let role = caps[1].to_string();
        let name = caps[2].to_string();
        if is_recognized_role(&role) && !name.contains('=') {
            return Ok(ParsedSelector::Aria { role, name });
        }
    }

    // 6. Prefix `role=`.
    if let Some(rest) = s.strip_prefix("role=") {
        let (role_part, name) = match ROLE_NAME_SUFFIX_PATTERN.captures(rest) {
            Some(caps) => (ROLE_NAME_SUFFIX_PATTERN.replace(rest, "").trim().to_string(), Some(caps[1].to_string())),
            None => (rest.trim().to_string(), None),
        };
        return Ok(ParsedSelector::Role { role: role_part, name });
    }

    // 7. Prefix `text=`.
    if let Some(rest) = s.strip_prefix("text=") {
        return Ok(ParsedSelector::Text(rest.to_string()));
    }

    // 8. Prefix `label=`.
    if let Some(rest) = s.strip_prefix("label=") {
        return Ok(ParsedSelector::Label(rest.to_string()));
    }

    // 9. Prefix `placeholder=`.
    if let Some(rest) = s.strip_prefix("placeholder=") {
        return Ok(ParsedSelector::Placeholder(rest.to_string()));
    }

    // 10. CSS heuristic.
    if s.contains(CSS_SIGNAL_CHARS) {
        return Ok(ParsedSelector::Css(s.to_string()));
    }

    // 11. Fallback: non-exact visible-text match.
    Ok(ParsedSelector::FallbackText(s.to_string()))
}

fn reject_tree_path(s: &str) -> SelectorError {
    SelectorError(format!(
        "\"{s}\" looks like an accessibility-tree path, not a selector. Use the ARIA form instead: role \"name\" (e.g. button \"Submit\")."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_dash() {
        let parsed = parse_selector("- button \"Submit\"").unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::Aria {
                role: "button".to_string(),
                name: "Submit".to_string()
            }
        );
    }

    #[test]
    fn rejects_root_case_insensitive() {
        assert!(parse_selector("ROOT > GENERIC > BUTTON[3]").is_err());
        assert!(parse_selector("root generic").is_err());
        assert!(parse_selector("some Root thing").is_err());
    }

    #[test]
    fn rejects_uppercase_tree_path_with_digit() {
        assert!(parse_selector("DIV > SPAN 2").is_err());
    }

    #[test]
    fn allows_similar_but_non_matching_strings() {
        // no digit -> not a tree-path hallucination, falls through to CSS/fallback
        assert!(parse_selector("DIV > SPAN").is_ok());
    }

    #[test]
    fn nested_aria_scope() {
        let parsed = parse_selector(r#"list "Results" listitem "Item 2""#).unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::NestedAria {
                parent_role: "list".to_string(),
                parent_name: "Results".to_string(),
                child_role: "listitem".to_string(),
                child_name: "Item 2".to_string(),
            }
        );
    }

    #[test]
    fn aria_quoted_with_bracket_suffix() {
        let parsed = parse_selector(r#"button "Apply" [3]"#).unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::Aria {
                role: "button".to_string(),
                name: "Apply".to_string()
            }
        );
    }

    #[test]
    fn aria_unquoted_is_greedy() {
        // Deliberately kept greedy per spec: "button Submit now" matches
        // role=button, name="Submit now", not narrowed to one word.
        let parsed = parse_selector("button Submit now").unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::Aria {
                role: "button".to_string(),
                name: "Submit now".to_string()
            }
        );
    }

    #[test]
    fn unrecognized_role_falls_through_to_fallback_text() {
        let parsed = parse_selector("widget something").unwrap();
        assert_eq!(parsed, ParsedSelector::FallbackText("widget something".to_string()));
    }

    #[test]
    fn role_prefix_with_name() {
        let parsed = parse_selector("role=button[name='Submit']").unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::Role {
                role: "button".to_string(),
                name: Some("Submit".to_string())
            }
        );
    }

    #[test]
    fn role_prefix_without_name() {
        let parsed = parse_selector("role=button").unwrap();
        assert_eq!(
            parsed,
            ParsedSelector::Role {
                role: "button".to_string(),
                name: None
            }
        );
    }

    #[test]
    fn text_label_placeholder_prefixes() {
        assert_eq!(parse_selector("text=Sign in").unwrap(), ParsedSelector::Text("Sign in".to_string()));
        assert_eq!(parse_selector("label=Email").unwrap(), ParsedSelector::Label("Email".to_string()));
        assert_eq!(
            parse_selector("placeholder=Search...").unwrap(),
            ParsedSelector::Placeholder("Search...".to_string())
        );
    }

    #[test]
    fn css_heuristic() {
        assert_eq!(parse_selector("#submit-btn").unwrap(), ParsedSelector::Css("#submit-btn".to_string()));
        assert_eq!(parse_selector(".btn.primary").unwrap(), ParsedSelector::Css(".btn.primary".to_string()));
        assert_eq!(
            parse_selector("div[data-id='3']").unwrap(),
            ParsedSelector::Css("div[data-id='3']".to_string())
        );
    }

    #[test]
    fn plain_text_falls_back() {
        assert_eq!(parse_selector("Submit the form").unwrap(), ParsedSelector::FallbackText("Submit the form".to_string()));
    }
}
