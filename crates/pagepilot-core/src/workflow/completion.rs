//! Pluggable "generation finished" predicates.

use async_trait::async_trait;
use pagepilot_config::CompletionRule;
use pagepilot_protocols::{BrowserPage, ElementHandle, SelectorSet};
use tracing::debug;

use crate::error::Result;
use crate::selector::SelectorResolver;

/// A completion predicate armed before the trigger and polled afterwards.
#[async_trait]
pub trait CompletionSignal: Send + Sync {
    fn name(&self) -> &str;

    /// Record whatever baseline the predicate compares against.
    async fn arm(&mut self, page: &dyn BrowserPage) -> Result<()>;

    /// `Some` once the work is done, carrying the element most likely to
    /// hold the artifact.
    async fn check(&self, page: &dyn BrowserPage) -> Result<Option<Option<ElementHandle>>>;
}

/// Fires when any candidate is visible.
pub struct ElementAppears {
    selector: SelectorSet,
}

impl ElementAppears {
    pub fn new(selector: SelectorSet) -> Self {
        Self { selector }
    }
}

#[async_trait]
impl CompletionSignal for ElementAppears {
    fn name(&self) -> &str {
        "element_appears"
    }

    async fn arm(&mut self, _page: &dyn BrowserPage) -> Result<()> {
        Ok(())
    }

    async fn check(&self, page: &dyn BrowserPage) -> Result<Option<Option<ElementHandle>>> {
        Ok(SelectorResolver::new(page)
            .find_visible(&self.selector)
            .await?
            .map(Some))
    }
}

/// Fires when `items` outnumber the armed baseline and `ready` is visible again.
pub struct CountIncreased {
    items: SelectorSet,
    ready: Option<SelectorSet>,
    baseline: usize,
}

impl CountIncreased {
    pub fn new(items: SelectorSet, ready: Option<SelectorSet>) -> Self {
        Self {
            items,
            ready,
            baseline: 0,
        }
    }
}

#[async_trait]
impl CompletionSignal for CountIncreased {
    fn name(&self) -> &str {
        "count_increased"
    }

    async fn arm(&mut self, page: &dyn BrowserPage) -> Result<()> {
        self.baseline = SelectorResolver::new(page).count(&self.items).await?;
        debug!(items = %self.items.label(), baseline = self.baseline, "Armed count signal");
        Ok(())
    }

    async fn check(&self, page: &dyn BrowserPage) -> Result<Option<Option<ElementHandle>>> {
        let resolver = SelectorResolver::new(page);
        if resolver.count(&self.items).await? <= self.baseline {
            return Ok(None);
        }
        if let Some(ready) = &self.ready {
            if resolver.find_visible(ready).await?.is_none() {
                return Ok(None);
            }
        }
        let newest = resolver.find_all_visible(&self.items).await?.pop();
        Ok(Some(newest))
    }
}

/// Fresh, unarmed signals for one execution.
pub(crate) fn build_signals(rules: &[CompletionRule]) -> Vec<Box<dyn CompletionSignal>> {
    rules
        .iter()
        .map(|rule| -> Box<dyn CompletionSignal> {
            match rule {
                CompletionRule::ElementAppears { selector } => {
                    Box::new(ElementAppears::new(selector.clone()))
                }
                CompletionRule::CountIncreased { items, ready } => {
                    Box::new(CountIncreased::new(items.clone(), ready.clone()))
                }
            }
        })
        .collect()
}
