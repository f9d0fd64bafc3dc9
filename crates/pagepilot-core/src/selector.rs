//! Selector resolution with visibility checks.

use std::time::Duration;

use pagepilot_protocols::{BrowserPage, ElementHandle, PageError, Selector, SelectorSet};
use tracing::{debug, trace};

use crate::error::{AutomationError, Result};
use crate::wait::{wait_for, PollError};

/// Resolves [`SelectorSet`]s against one page.
///
/// Candidates are tried in order and the first visible match wins. Lookup
/// problems (bad selector syntax, nodes detached mid-check) count as "no
/// match"; only disconnections propagate.
#[derive(Clone, Copy)]
pub struct SelectorResolver<'a> {
    page: &'a dyn BrowserPage,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(page: &'a dyn BrowserPage) -> Self {
        Self { page }
    }

    /// First visible element matching the set, in candidate order.
    pub async fn find_visible(&self, set: &SelectorSet) -> Result<Option<ElementHandle>> {
        for selector in set {
            if let Some(element) = self.first_visible(selector).await? {
                trace!(selector = %selector, "Resolved visible element");
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// All visible elements matching the first candidate that has any.
    pub async fn find_all_visible(&self, set: &SelectorSet) -> Result<Vec<ElementHandle>> {
        for selector in set {
            let mut found = Vec::new();
            for element in self.matches(selector).await? {
                if self.is_visible(&element, selector).await? {
                    found.push(element);
                }
            }
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// Number of elements (visible or not) matching the first candidate that has any.
    pub async fn count(&self, set: &SelectorSet) -> Result<usize> {
        Ok(self.last_match(set).await?.map(|(n, _)| n).unwrap_or(0))
    }

    /// Text of the last element matching the first candidate that has any.
    pub async fn last_text(&self, set: &SelectorSet) -> Result<Option<String>> {
        let Some((_, element)) = self.last_match(set).await? else {
            return Ok(None);
        };
        match self.page.inner_text(&element).await {
            Ok(text) => Ok(Some(text)),
            Err(e) => absorb(e, None),
        }
    }

    /// Poll until a visible element matches.
    pub async fn wait_visible(
        &self,
        set: &SelectorSet,
        timeout: Duration,
        interval: Duration,
    ) -> Result<ElementHandle> {
        let this = *self;
        wait_for(
            move || async move { this.find_visible(set).await.map_err(PollError::from) },
            timeout,
            interval,
            &set.label(),
        )
        .await
    }

    /// Poll until any element matches, visible or not.
    pub async fn wait_attached(
        &self,
        set: &SelectorSet,
        timeout: Duration,
        interval: Duration,
    ) -> Result<ElementHandle> {
        let this = *self;
        wait_for(
            move || async move {
                for selector in set {
                    if let Some(first) = this.matches(selector).await?.into_iter().next() {
                        return Ok(Some(first));
                    }
                }
                Ok(None)
            },
            timeout,
            interval,
            &set.label(),
        )
        .await
    }

    /// Poll until a visible match is enabled (no `disabled`, no `aria-disabled="true"`).
    pub async fn wait_enabled(
        &self,
        set: &SelectorSet,
        timeout: Duration,
        interval: Duration,
    ) -> Result<ElementHandle> {
        let this = *self;
        let label = format!("{} enabled", set.label());
        wait_for(
            move || async move { this.enabled_check(set).await },
            timeout,
            interval,
            &label,
        )
        .await
    }

    async fn enabled_check(
        &self,
        set: &SelectorSet,
    ) -> std::result::Result<Option<ElementHandle>, PollError> {
        let Some(element) = self.find_visible(set).await? else {
            return Ok(None);
        };
        let state = self.page.element_state(&element).await?;
        Ok(state.is_enabled().then_some(element))
    }

    async fn first_visible(&self, selector: &Selector) -> Result<Option<ElementHandle>> {
        for element in self.matches(selector).await? {
            if self.is_visible(&element, selector).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn last_match(&self, set: &SelectorSet) -> Result<Option<(usize, ElementHandle)>> {
        for selector in set {
            let matches = self.matches(selector).await?;
            let count = matches.len();
            if let Some(last) = matches.into_iter().last() {
                return Ok(Some((count, last)));
            }
        }
        Ok(None)
    }

    /// Elements matching the CSS part and, if present, the text filter.
    async fn matches(&self, selector: &Selector) -> Result<Vec<ElementHandle>> {
        let elements = match self.page.query_all(selector.css_part()).await {
            Ok(elements) => elements,
            Err(e) => return absorb(e, Vec::new()),
        };

        let Some(needle) = selector.text_filter() else {
            return Ok(elements);
        };

        let mut filtered = Vec::new();
        for element in elements {
            let text = match self.page.inner_text(&element).await {
                Ok(text) => text,
                Err(e) => absorb(e, String::new())?,
            };
            if text.contains(needle) {
                filtered.push(element);
            }
        }
        Ok(filtered)
    }

    async fn is_visible(&self, element: &ElementHandle, selector: &Selector) -> Result<bool> {
        match self.page.element_state(element).await {
            Ok(state) => Ok(state.is_visible()),
            Err(e) => {
                trace!(selector = %selector, error = %e, "Visibility check failed");
                absorb(e, false)
            }
        }
    }
}

/// Treat a lookup failure as "nothing here" unless the page is gone.
fn absorb<T>(error: PageError, fallback: T) -> Result<T> {
    if error.is_disconnect() {
        return Err(AutomationError::Page(error));
    }
    if let PageError::InvalidSelector { selector, message } = &error {
        debug!(%selector, %message, "Skipping invalid selector");
    }
    Ok(fallback)
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
