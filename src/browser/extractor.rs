//! Page extractor (C3)
//!
//! Turns a live page into a token-budgeted, accessibility-tree text
//! snapshot. Every I/O step is wrapped in a soft timeout that substitutes a
//! documented fallback value instead of propagating an error — extraction
//! must never throw, only degrade.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::accessibility::{AxNode, GetFullAxTreeParams};
use chromiumoxide::page::Page;
use tokio::time::timeout;

pub const DEFAULT_TOKEN_BUDGET: usize = 6000;
const TRUNCATION_SENTINEL: &str = "[… content truncated due to length …]";
const MAX_WALK_DEPTH: u32 = 6;

const WAIT_FOR_DOM_TIMEOUT: Duration = Duration::from_secs(10);
const TITLE_TIMEOUT: Duration = Duration::from_secs(5);
const AX_TREE_TIMEOUT: Duration = Duration::from_secs(10);
const AX_TREE_OUTER_GUARD: Duration = Duration::from_secs(15);
const SCROLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Produce the bounded observation text for the current page.
pub async fn extract(page: &Page, token_budget: usize) -> String {
    wait_for_dom(page).await;

    let title = fetch_title(page).await;
    let url = page.url().await.ok().flatten().unwrap_or_default();
    let scroll_info = fetch_scroll_info(page).await;
    let tree = fetch_accessibility_tree(page).await;
    let truncated = truncate_to_budget(&tree, token_budget);

    format!("Page: {title}\nURL: {url}\n{scroll_info}\n\nAccessibility Tree:\n{truncated}")
}

async fn wait_for_dom(page: &Page) {
    let _ = timeout(WAIT_FOR_DOM_TIMEOUT, async {
        loop {
            if let Ok(Some(ready)) = page
                .evaluate("document.readyState")
                .await
                .map(|r| r.into_value::<String>().ok())
            {
                if ready == "complete" || ready == "interactive" {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
}

async fn fetch_title(page: &Page) -> String {
    match timeout(TITLE_TIMEOUT, page.get_title()).await {
        Ok(Ok(Some(title))) => title,
        _ => "Loading…".to_string(),
    }
}

async fn fetch_scroll_info(page: &Page) -> String {
    match timeout(SCROLL_TIMEOUT, page.evaluate("window.scrollY")).await {
        Ok(Ok(result)) => match result.into_value::<f64>() {
            Ok(y) => format!("Scroll: {}px", y as i64),
            Err(_) => "Scroll: unknown".to_string(),
        },
        _ => "Scroll: unknown".to_string(),
    }
}

async fn fetch_accessibility_tree(page: &Page) -> String {
    let primary = timeout(AX_TREE_TIMEOUT, primary_ax_tree(page)).await;
    if let Ok(Some(text)) = primary {
        if !text.trim().is_empty() {
            return text;
        }
    }

    match timeout(AX_TREE_OUTER_GUARD, fallback_walk(page)).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

async fn primary_ax_tree(page: &Page) -> Option<String> {
    let response = page.execute(GetFullAxTreeParams::default()).await.ok()?;
    let nodes = &response.result.nodes;
    if nodes.is_empty() {
        return None;
    }
    Some(render_ax_tree(nodes))
}

/// Renders the flat `AXNode` list CDP returns as a nested, indented
/// role/name tree. The root is the node that never appears in any other
/// node's `child_ids`.
fn render_ax_tree(nodes: &[AxNode]) -> String {
    let by_id: HashMap<_, _> = nodes.iter().map(|n| (n.node_id.clone(), n)).collect();
    let mut referenced: HashSet<_> = HashSet::new();
    for node in nodes {
        if let Some(children) = &node.child_ids {
            referenced.extend(children.iter().cloned());
        }
    }

    let mut output = String::new();
    for node in nodes {
        if !referenced.contains(&node.node_id) {
            render_node(node, &by_id, 0, &mut output);
        }
    }
    output
}

fn render_node(node: &AxNode, by_id: &HashMap<chromiumoxide::cdp::browser_protocol::accessibility::AxNodeId, &AxNode>, depth: u32, out: &mut String) {
    if node.ignored {
        return;
    }

    let role = ax_value_as_string(node.role.as_ref()).unwrap_or_else(|| "generic".to_string());
    let name = ax_value_as_string(node.name.as_ref()).unwrap_or_default();
    let indent = "  ".repeat(depth as usize);
    out.push_str(&format!("{indent}- {role} \"{name}\"\n"));

    if let Some(children) = &node.child_ids {
        for child_id in children {
            if let Some(child) = by_id.get(child_id) {
                render_node(child, by_id, depth + 1, out);
            }
        }
    }
}

fn ax_value_as_string(value: Option<&chromiumoxide::cdp::browser_protocol::accessibility::AxValue>) -> Option<String> {
    let v = value?;
    let json = v.value.as_ref()?;
    json.as_str().map(str::to_string).or_else(|| Some(json.to_string()))
}

/// In-page depth-limited (<=6) walk used when the primary accessibility
/// tree is empty or unavailable: one line per element,
/// `"<indent>- <role-or-tag> \"<label-or-text>\" [href=...] [type=...] [placeholder=...] [clickable]"`.
async fn fallback_walk(page: &Page) -> Result<String, chromiumoxide::error::CdpError> {
    let script = format!(
        r#"(() => {{
  {accessible_name_fn}
  const maxDepth = {max_depth};
  const lines = [];
  function isClickable(el) {{
    const style = window.getComputedStyle(el);
    return style.cursor === 'pointer' || ['A', 'BUTTON'].includes(el.tagName) || el.onclick != null;
  }}
  function walk(el, depth) {{
    if (depth > maxDepth || !el || el.nodeType !== 1) return;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return;

    const role = el.getAttribute('role') || el.tagName.toLowerCase();
    const name = wfAccessibleName(el);
    let line = '  '.repeat(depth) + '- ' + role + ' "' + name.replace(/"/g, "'").slice(0, 200) + '"';
    const href = el.getAttribute('href');
    if (href) line += ' [href=' + href + ']';
    const type = el.getAttribute('type');
    if (type) line += ' [type=' + type + ']';
    const placeholder = el.getAttribute('placeholder');
    if (placeholder) line += ' [placeholder=' + placeholder + ']';
    if (isClickable(el)) line += ' [clickable]';
    if (name || href || type || placeholder || isClickable(el)) lines.push(line);

    for (const child of el.children) walk(child, depth + 1);
  }}
  walk(document.body, 0);
  return lines.join('\n');
}})()"#,
        accessible_name_fn = super::js::ACCESSIBLE_NAME_FN,
        max_depth = MAX_WALK_DEPTH,
    );

    let result = page.evaluate(script).await?;
    Ok(result.into_value::<String>().unwrap_or_default())
}

/// Truncate to `tokenBudget * 4` characters, cutting at the last complete
/// line within the limit and appending the sentinel. The sentinel's own
/// length (plus its leading newline) is reserved from the budget first, so
/// the final string — body plus sentinel — never exceeds the limit, and the
/// cut point is walked back to a char boundary so multi-byte text (Cyrillic
/// accessibility-tree names, emoji, etc.) never splits mid-codepoint.
fn truncate_to_budget(text: &str, token_budget: usize) -> String {
    let max_chars = token_budget * 4;
    if text.len() <= max_chars {
        return text.to_string();
    }

    let sentinel_len = 1 + TRUNCATION_SENTINEL.len(); // leading '\n' + sentinel
    let body_budget = max_chars.saturating_sub(sentinel_len);

    let mut boundary = body_budget.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }

    let slice = &text[..boundary];
    let cut = slice.rfind('\n').unwrap_or(slice.len());
    format!("{}\n{TRUNCATION_SENTINEL}", &slice[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_under_budget_is_unchanged() {
        let text = "line one\nline two";
        assert_eq!(truncate_to_budget(text, 100), text);
    }

    #[test]
    fn truncate_cuts_at_last_complete_line() {
        let text = "aaaa\nbbbb\ncccc\ndddd";
        // budget=13 -> 52 chars; minus the reserved sentinel (42) leaves a
        // 10-char body budget, enough for "aaaa\nbbbb\n" but not "cccc".
        let truncated = truncate_to_budget(text, 13);
        assert!(truncated.ends_with(TRUNCATION_SENTINEL));
        assert!(truncated.starts_with("aaaa\nbbbb"));
        assert!(!truncated.contains("cccc"));
    }

    #[test]
    fn truncated_output_never_exceeds_the_budget() {
        let text = "aaaa\nbbbb\ncccc\ndddd";
        let truncated = truncate_to_budget(text, 13);
        assert!(truncated.len() <= 13 * 4);
    }

    #[test]
    fn truncate_does_not_panic_on_multibyte_boundary() {
        // Each "привет" line is Cyrillic (2 bytes/char), so a byte-index cut
        // picked without char-boundary care would land mid-codepoint.
        let line = "привет ".repeat(20); // well over any small budget, all multi-byte
        let text = format!("{line}\n{line}\n{line}");
        for budget in 1..60 {
            // must not panic for any budget, however small
            let _ = truncate_to_budget(&text, budget);
        }
    }
}
