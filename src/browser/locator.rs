//! Binds a `ParsedSelector` to a live page.
//!
//! `chromiumoxide` only exposes CSS-based `find_element`/`find_elements`, so
//! every non-CSS resolution strategy is compiled into a small generated JS
//! predicate (see `browser::js`) that stamps matching elements with a
//! throwaway marker attribute; the marker is then re-queried as plain CSS to
//! get real `chromiumoxide::Element` handles back, in document order.

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use uuid::Uuid;

use super::js::{mark_matches_script, role_selector};
use super::selector::{parse_selector, ParsedSelector, SelectorError};
use super::session::BrowserError;

const MARKER_ATTR: &str = "data-wayfarer-match";

pub struct Locator<'p> {
    page: &'p Page,
    parsed: ParsedSelector,
}

impl<'p> Locator<'p> {
    pub fn new(page: &'p Page, parsed: ParsedSelector) -> Self {
        Self { page, parsed }
    }

    /// Parse and bind in one step.
    pub fn bind(page: &'p Page, selector_str: &str) -> Result<Self, SelectorError> {
        Ok(Self::new(page, parse_selector(selector_str)?))
    }

    /// All matching elements, in document order.
    pub async fn elements(&self) -> Result<Vec<Element>, BrowserError> {
        match &self.parsed {
            ParsedSelector::Css(css) => self
                .page
                .find_elements(css.as_str())
                .await
                .map_err(BrowserError::from),
            _ => self.elements_via_marker().await,
        }
    }

    pub async fn count(&self) -> Result<usize, BrowserError> {
        Ok(self.elements().await?.len())
    }

    pub async fn first(&self) -> Result<Element, BrowserError> {
        self.elements()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::OperationFailed("no element matched the selector".to_string()))
    }

    async fn elements_via_marker(&self) -> Result<Vec<Element>, BrowserError> {
        let marker = Uuid::new_v4().to_string();
        let script = self.build_marking_script(&marker);
        self.page
            .evaluate(script)
            .await
            .map_err(BrowserError::from)?;

        let selector = format!("[{MARKER_ATTR}='{marker}']");
        self.page.find_elements(selector.as_str()).await.map_err(BrowserError::from)
    }

    fn build_marking_script(&self, marker: &str) -> String {
        match &self.parsed {
            ParsedSelector::Css(_) => unreachable!("CSS selectors are resolved without JS marking"),
            ParsedSelector::Aria { role, name } => {
                let predicate = format!("name.toLowerCase() === {}", json_str(&name.to_lowercase()));
                mark_matches_script("document", &role_selector(role), &predicate, MARKER_ATTR, marker)
            }
            ParsedSelector::Role { role, name } => {
                let predicate = match name {
                    Some(name) => format!("name.toLowerCase() === {}", json_str(&name.to_lowercase())),
                    None => "true".to_string(),
                };
                mark_matches_script("document", &role_selector(role), &predicate, MARKER_ATTR, marker)
            }
            ParsedSelector::Text(text) | ParsedSelector::FallbackText(text) => {
                let predicate = format!("text.toLowerCase().includes({})", json_str(&text.to_lowercase()));
                mark_matches_script("document", TEXT_CANDIDATE_SELECTOR, &predicate, MARKER_ATTR, marker)
            }
            ParsedSelector::Label(text) => {
                let predicate = format!("name.toLowerCase().includes({})", json_str(&text.to_lowercase()));
                mark_matches_script("document", LABELABLE_CANDIDATE_SELECTOR, &predicate, MARKER_ATTR, marker)
            }
            ParsedSelector::Placeholder(text) => {
                let predicate = format!("name.toLowerCase().includes({})", json_str(&text.to_lowercase()));
                mark_matches_script("document", "[placeholder]", &predicate, MARKER_ATTR, marker)
            }
            ParsedSelector::NestedAria {
                parent_role,
                parent_name,
                child_role,
                child_name,
            } => build_nested_script(parent_role, parent_name, child_role, child_name, MARKER_ATTR, marker),
        }
    }
}

const TEXT_CANDIDATE_SELECTOR: &str =
    "a, button, input, textarea, select, label, li, option, h1, h2, h3, h4, h5, h6, span, p, div, td, th, [role]";
const LABELABLE_CANDIDATE_SELECTOR: &str = "input, textarea, select, button, a, [role]";

fn json_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn build_nested_script(parent_role: &str, parent_name: &str, child_role: &str, child_name: &str, marker_attr: &str, marker: &str) -> String {
    format!(
        r#"(() => {{
  {accessible_name_fn}
  const parents = Array.from(document.querySelectorAll({parent_selector})).filter(el => wfAccessibleName(el).toLowerCase() === {parent_name});
  if (parents.length === 0) return 0;
  const parent = parents[0];
  const children = Array.from(parent.querySelectorAll({child_selector})).filter(el => wfAccessibleName(el).toLowerCase() === {child_name});
  let count = 0;
  for (const el of children) {{
    el.setAttribute('{marker_attr}', '{marker}');
    count += 1;
  }}
  return count;
}})()"#,
        accessible_name_fn = super::js::ACCESSIBLE_NAME_FN,
        parent_selector = json_str(&role_selector(parent_role)),
        parent_name = json_str(&parent_name.to_lowercase()),
        child_selector = json_str(&role_selector(child_role)),
        child_name = json_str(&child_name.to_lowercase()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_str_escapes_quotes() {
        assert_eq!(json_str("it's \"quoted\""), "\"it's \\\"quoted\\\"\"");
    }
}
