//! Shared in-page JavaScript fragments.
//!
//! `chromiumoxide` has no native `getByRole`/`getByText`/`getByLabel` (unlike
//! the Playwright-style driver the spec is written against), so role/name,
//! text, label and placeholder matching are compiled to small generated
//! predicates evaluated in-page via `Page::evaluate` — the same bridging
//! technique the teacher repo already uses for its wait-for-selector
//! polling. The accessible-name approximation here is shared between the
//! selector resolver's locator binding and the fallback page extractor so
//! both layers agree on what a role/name "is".

/// A rough approximation of the accessible name computation: explicit
/// `aria-label`, an associated `<label>`, `placeholder`, `title`, `alt`, or
/// else trimmed text content. Good enough for selector matching; not a
/// spec-complete accname implementation.
pub const ACCESSIBLE_NAME_FN: &str = r"
function wfAccessibleName(el) {
  const ariaLabel = el.getAttribute && el.getAttribute('aria-label');
  if (ariaLabel) return ariaLabel.trim();
  if (el.id) {
    const label = document.querySelector(`label[for='${CSS.escape(el.id)}']`);
    if (label && label.textContent) return label.textContent.trim();
  }
  const closestLabel = el.closest && el.closest('label');
  if (closestLabel && closestLabel.textContent) return closestLabel.textContent.trim();
  const placeholder = el.getAttribute && el.getAttribute('placeholder');
  if (placeholder) return placeholder.trim();
  const title = el.getAttribute && el.getAttribute('title');
  if (title) return title.trim();
  if (el.tagName === 'IMG' && el.alt) return el.alt.trim();
  if (el.value !== undefined && (el.tagName === 'INPUT' || el.tagName === 'BUTTON') && el.value) return String(el.value).trim();
  return (el.textContent || '').trim();
}
";

/// Maps an ARIA role to a CSS selector matching elements with that implicit
/// or explicit role. Falls back to `[role="<role>"]` for roles with no
/// well-known native element.
pub fn role_selector(role: &str) -> String {
    let role = role.to_ascii_lowercase();
    let native = match role.as_str() {
        "button" => "button, [role='button'], input[type='button'], input[type='submit'], input[type='reset']",
        "link" => "a[href], [role='link']",
        "textbox" => "input[type='text'], input[type='email'], input[type='search'], input:not([type]), textarea, [role='textbox']",
        "searchbox" => "input[type='search'], [role='searchbox']",
        "checkbox" => "input[type='checkbox'], [role='checkbox']",
        "radio" => "input[type='radio'], [role='radio']",
        "combobox" => "select, [role='combobox']",
        "listbox" => "select[multiple], [role='listbox']",
        "heading" => "h1, h2, h3, h4, h5, h6, [role='heading']",
        "img" => "img, [role='img']",
        "list" => "ul, ol, [role='list']",
        "listitem" => "li, [role='listitem']",
        "table" => "table, [role='table']",
        "row" => "tr, [role='row']",
        "cell" => "td, [role='cell']",
        "columnheader" => "th, [role='columnheader']",
        "navigation" => "nav, [role='navigation']",
        "form" => "form, [role='form']",
        "dialog" => "dialog, [role='dialog']",
        "tab" => "[role='tab']",
        "tabpanel" => "[role='tabpanel']",
        "menu" => "menu, [role='menu']",
        "menuitem" => "[role='menuitem']",
        "progressbar" => "progress, [role='progressbar']",
        "slider" => "input[type='range'], [role='slider']",
        "spinbutton" => "input[type='number'], [role='spinbutton']",
        "status" => "[role='status'], output",
        "switch" => "[role='switch']",
        other => return format!("[role='{other}']"),
    };
    format!("{native}, [role='{role}']")
}

/// Builds an in-page predicate function body that returns `true` for
/// elements whose role-selector membership and accessible name (or text
/// content, for the text/label/placeholder variants) match. `marker_attr`
/// is the attribute name the caller will stamp onto matches so they can be
/// re-queried as plain CSS afterward.
pub fn mark_matches_script(root_expr: &str, candidate_selector: &str, predicate_body: &str, marker_attr: &str, marker_value: &str) -> String {
    let candidate_selector_js = serde_json::to_string(candidate_selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
  {accessible_name_fn}
  const root = {root_expr};
  if (!root) return 0;
  const candidates = Array.from(root.querySelectorAll({candidate_selector_js}));
  let count = 0;
  for (const el of candidates) {{
    const name = wfAccessibleName(el);
    const text = (el.textContent || '').trim();
    if ({predicate_body}) {{
      el.setAttribute('{marker_attr}', '{marker_value}');
      count += 1;
    }}
  }}
  return count;
}})()"#,
        accessible_name_fn = ACCESSIBLE_NAME_FN,
    )
}
