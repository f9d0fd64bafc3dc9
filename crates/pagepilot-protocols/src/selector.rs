//! Selector candidates.
//!
//! A [`SelectorSet`] is an ordered list of alternatives for the same UI
//! element. The list is intentionally redundant so that small DOM changes in
//! the target application do not break a workflow: the first candidate that
//! resolves to a visible element wins.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single element query.
///
/// Deserializes from either a bare CSS string or `{ "css": .., "text": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// Plain CSS selector.
    Css(String),
    /// Elements matching `css` whose visible text contains `text`.
    Text { css: String, text: String },
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            css: css.into(),
            text: text.into(),
        }
    }

    /// The CSS part of the query, handed to the page's query engine.
    pub fn css_part(&self) -> &str {
        match self {
            Selector::Css(css) => css,
            Selector::Text { css, .. } => css,
        }
    }

    /// Text filter, if any.
    pub fn text_filter(&self) -> Option<&str> {
        match self {
            Selector::Css(_) => None,
            Selector::Text { text, .. } => Some(text),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{}", css),
            Selector::Text { css, text } => write!(f, "{}:has-text({:?})", css, text),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::Css(s.to_string())
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::Css(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorSetRepr {
    One(Selector),
    Many(Vec<Selector>),
}

impl From<SelectorSetRepr> for SelectorSet {
    fn from(repr: SelectorSetRepr) -> Self {
        match repr {
            SelectorSetRepr::One(s) => SelectorSet(vec![s]),
            SelectorSetRepr::Many(v) => SelectorSet(v),
        }
    }
}

/// Ordered selector candidates, tried in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectorSetRepr")]
pub struct SelectorSet(Vec<Selector>);

impl SelectorSet {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self(selectors)
    }

    pub fn single(selector: impl Into<Selector>) -> Self {
        Self(vec![selector.into()])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Selector> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short human-readable label for logs and timeout messages.
    pub fn label(&self) -> String {
        match self.0.as_slice() {
            [] => "<empty selector set>".to_string(),
            [only] => only.to_string(),
            [first, rest @ ..] => format!("{} (+{} alternatives)", first, rest.len()),
        }
    }
}

impl<S: Into<Selector>> FromIterator<S> for SelectorSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a SelectorSet {
    type Item = &'a Selector;
    type IntoIter = std::slice::Iter<'a, Selector>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
