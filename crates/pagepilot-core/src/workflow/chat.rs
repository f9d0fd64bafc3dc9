//! Chat-assistant workflow: type, send, wait for a stable answer.

use async_trait::async_trait;
use pagepilot_config::{ChatSelectors, PromptItem};
use pagepilot_protocols::BrowserPage;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{apply_mode, prepare_page, requested_mode, StepTiming, Workflow};
use crate::error::{AutomationError, Result};
use crate::result::TaskOutput;
use crate::selector::SelectorResolver;
use crate::session::SessionManager;
use crate::stability::{wait_for_stable, Sample};
use crate::wait::{wait_until, PollError};

pub struct ChatWorkflow {
    selectors: ChatSelectors,
    timing: StepTiming,
    default_mode: Option<String>,
    skip_mode_switch: bool,
}

impl ChatWorkflow {
    pub fn new(selectors: ChatSelectors, timing: StepTiming) -> Self {
        Self {
            selectors,
            timing,
            default_mode: None,
            skip_mode_switch: false,
        }
    }

    pub fn with_mode(mut self, mode: Option<String>, skip_mode_switch: bool) -> Self {
        self.default_mode = mode;
        self.skip_mode_switch = skip_mode_switch;
        self
    }

    async fn is_busy(&self, page: &dyn BrowserPage) -> Result<bool> {
        if self.selectors.busy.is_empty() {
            return Ok(false);
        }
        Ok(SelectorResolver::new(page)
            .find_visible(&self.selectors.busy)
            .await?
            .is_some())
    }

    async fn idle_check(&self, page: &dyn BrowserPage) -> std::result::Result<bool, PollError> {
        Ok(!self.is_busy(page).await?)
    }

    async fn count_check(
        &self,
        page: &dyn BrowserPage,
        before: usize,
    ) -> std::result::Result<bool, PollError> {
        let now = SelectorResolver::new(page).count(&self.selectors.message).await?;
        Ok(now > before)
    }

    /// Latest answer text; still in progress while busy or empty.
    async fn answer_sample(
        &self,
        page: &dyn BrowserPage,
    ) -> std::result::Result<Sample<String>, PollError> {
        let text = SelectorResolver::new(page)
            .last_text(&self.selectors.message)
            .await?
            .unwrap_or_default();
        let busy = self.is_busy(page).await?;
        let empty = text.trim().is_empty();
        Ok(Sample::new(text, busy || empty))
    }

    /// Click the send button once enabled; press Enter when there is none.
    async fn send(&self, page: &dyn BrowserPage) -> Result<()> {
        if !self.selectors.send_button.is_empty() {
            match SelectorResolver::new(page)
                .wait_enabled(
                    &self.selectors.send_button,
                    self.timing.element_timeout,
                    self.timing.poll_interval,
                )
                .await
            {
                Ok(button) => {
                    page.click(&button).await?;
                    return Ok(());
                }
                Err(AutomationError::Timeout { .. }) => {
                    debug!("Send button not usable, pressing Enter");
                }
                Err(e) => return Err(e),
            }
        }
        page.press_key("Enter").await?;
        Ok(())
    }
}

#[async_trait]
impl Workflow for ChatWorkflow {
    fn name(&self) -> &str {
        "chat"
    }

    async fn prepare(&self, session: &mut SessionManager, attempt: u32) -> Result<()> {
        prepare_page(session, attempt, &self.selectors.dismiss, &self.timing).await
    }

    async fn execute(&self, session: &mut SessionManager, task: &PromptItem) -> Result<TaskOutput> {
        let page = session.page()?;
        let page = page.as_ref();
        let resolver = SelectorResolver::new(page);
        let timing = &self.timing;

        if let Some(mode) = requested_mode(task, self.default_mode.as_deref(), self.skip_mode_switch)
        {
            apply_mode(page, &self.selectors.modes, mode, timing).await?;
        }

        wait_until(
            || self.idle_check(page),
            timing.idle_timeout,
            timing.poll_interval,
            "assistant idle",
        )
        .await?;

        let before = resolver.count(&self.selectors.message).await?;
        let input = resolver
            .wait_visible(&self.selectors.input, timing.element_timeout, timing.poll_interval)
            .await?;
        page.fill(&input, &task.text).await?;
        self.send(page).await?;
        info!(index = task.index, messages_before = before, "Prompt sent");

        let deadline = Instant::now() + timing.answer_timeout;
        wait_until(
            || self.count_check(page, before),
            timing.answer_timeout,
            timing.poll_interval,
            "assistant message",
        )
        .await?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let text = wait_for_stable(
            || self.answer_sample(page),
            remaining.max(timing.stable_window),
            timing.stable_window,
            timing.poll_interval,
            "assistant answer",
        )
        .await?;

        let text = text.trim().to_string();
        info!(index = task.index, chars = text.chars().count(), "Answer received");
        Ok(TaskOutput::Text { text })
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
