//! Units of work driven by the orchestrator.
//!
//! A [`Workflow`] knows how to get a page ready ([`prepare`](Workflow::prepare))
//! and how to run one prompt through it ([`execute`](Workflow::execute)).
//! Both built-in workflows are configured entirely by selectors.

mod chat;
mod completion;
mod generation;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_config::{ModeConfig, PromptItem, TaskConfig, WorkflowConfig};
use pagepilot_protocols::{BrowserPage, ElementHandle, SelectorSet};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactAcquirer;
use crate::error::{AutomationError, Result};
use crate::result::TaskOutput;
use crate::selector::SelectorResolver;
use crate::session::SessionManager;
use crate::transcode::Transcoder;
use crate::wait::{wait_until, PollError};

pub use chat::ChatWorkflow;
pub use completion::{CompletionSignal, CountIncreased, ElementAppears};
pub use generation::{GenerationOptions, GenerationWorkflow};

/// At most this many popups are dismissed per attempt.
const MAX_DISMISSALS: usize = 3;

/// Pause after clicks that open or close UI.
const UI_PAUSE: Duration = Duration::from_millis(300);

/// One kind of task the engine can run.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    /// Re-establish preconditions before attempt number `attempt` (1-based).
    async fn prepare(&self, session: &mut SessionManager, attempt: u32) -> Result<()>;

    /// Run one prompt: mode, input, trigger, wait, acquire.
    async fn execute(&self, session: &mut SessionManager, task: &PromptItem) -> Result<TaskOutput>;
}

/// Bounds shared by workflow steps.
#[derive(Debug, Clone, Copy)]
pub struct StepTiming {
    /// Short waits: element visible, button enabled.
    pub element_timeout: Duration,
    pub poll_interval: Duration,
    /// Waiting for the application to go idle.
    pub idle_timeout: Duration,
    /// Chat answer wait.
    pub answer_timeout: Duration,
    pub stable_window: Duration,
    /// Generation completion wait.
    pub generation_timeout: Duration,
    /// Tries for reconnect-and-retry of navigation.
    pub reconnect_attempts: u32,
}

impl StepTiming {
    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            element_timeout: Duration::from_millis(config.element_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            idle_timeout: Duration::from_millis(config.global_timeout_ms),
            answer_timeout: Duration::from_millis(config.answer_wait_ms),
            stable_window: Duration::from_millis(config.stabilize_ms),
            generation_timeout: Duration::from_millis(config.wait_timeout_ms),
            reconnect_attempts: config.reconnect_attempts,
        }
    }
}

/// Build the workflow named by the configuration.
pub fn build_workflow(config: &TaskConfig) -> Result<Box<dyn Workflow>> {
    let workflow = config.resolved_workflow().ok_or_else(|| {
        AutomationError::Configuration("no workflow selectors and no preset given".to_string())
    })?;
    let timing = StepTiming::from_config(config);

    info!(kind = workflow.kind(), "Building workflow");
    Ok(match workflow {
        WorkflowConfig::Chat(selectors) => {
            Box::new(
                ChatWorkflow::new(selectors, timing)
                    .with_mode(config.mode.clone(), config.skip_mode_switch),
            )
        }
        WorkflowConfig::Generation(selectors) => {
            let acquirer = ArtifactAcquirer::new(
                config.acquisition.clone(),
                Transcoder::from_config(&config.transcode),
                config.keep_audio,
            )?
            .with_timing(timing.element_timeout, timing.poll_interval);
            let options = GenerationOptions {
                mode: config.mode.clone(),
                variant: config.variant.clone(),
                download: config.download,
                output_path: config.output_path.clone(),
                multiple_prompts: config.prompts.len() > 1,
                skip_mode_switch: config.skip_mode_switch,
                image_path: config.image_path.clone(),
            };
            Box::new(GenerationWorkflow::new(selectors, timing, options, Arc::new(acquirer)))
        }
    })
}

/// Shared `prepare`: live session, fresh navigation on retries, popups away.
pub(crate) async fn prepare_page(
    session: &mut SessionManager,
    attempt: u32,
    dismiss: &SelectorSet,
    timing: &StepTiming,
) -> Result<()> {
    session.ensure_live().await?;
    if attempt > 1 {
        if let Some(url) = session.options().goto_url.clone() {
            debug!(attempt, %url, "Reloading target page for retry");
            session.goto_with_retry(&url, timing.reconnect_attempts).await?;
        }
    }
    let page = session.page()?;
    dismiss_popups(page.as_ref(), dismiss).await
}

/// Click away visible popups; best-effort except for disconnects.
pub(crate) async fn dismiss_popups(page: &dyn BrowserPage, dismiss: &SelectorSet) -> Result<()> {
    if dismiss.is_empty() {
        return Ok(());
    }
    let resolver = SelectorResolver::new(page);
    let mut dismissed = 0;

    while dismissed < MAX_DISMISSALS {
        let Some(button) = resolver.find_visible(dismiss).await? else {
            break;
        };
        match page.click(&button).await {
            Ok(()) => {
                dismissed += 1;
                debug!(selector = %button.selector, "Dismissed popup");
                sleep(UI_PAUSE).await;
            }
            Err(e) if e.is_disconnect() => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "Popup click failed");
                break;
            }
        }
    }

    if dismissed > 0 {
        if let Err(e) = page.press_key("Escape").await {
            if e.is_disconnect() {
                return Err(e.into());
            }
        }
    }
    Ok(())
}

/// Mode for `task`: its own, else the default; none when switching is off.
pub(crate) fn requested_mode<'a>(
    task: &'a PromptItem,
    default: Option<&'a str>,
    skip: bool,
) -> Option<&'a str> {
    if skip {
        return None;
    }
    task.mode.as_deref().or(default)
}

/// Switch to a named mode; unknown names are logged and skipped.
pub(crate) async fn apply_mode(
    page: &dyn BrowserPage,
    modes: &BTreeMap<String, ModeConfig>,
    name: &str,
    timing: &StepTiming,
) -> Result<()> {
    match modes.get(name) {
        Some(mode) => ensure_mode(page, name, mode, timing).await,
        None => {
            warn!(mode = name, "Unknown mode, leaving the page as is");
            Ok(())
        }
    }
}

/// Activate mode `name`; a no-op when it is already active.
pub(crate) async fn ensure_mode(
    page: &dyn BrowserPage,
    name: &str,
    mode: &ModeConfig,
    timing: &StepTiming,
) -> Result<()> {
    let resolver = SelectorResolver::new(page);

    let Some(opener) = &mode.opener else {
        let toggle = resolver
            .wait_visible(&mode.option, timing.element_timeout, timing.poll_interval)
            .await?;
        if toggle_is_on(page, &toggle).await.unwrap_or(false) {
            debug!(mode = name, "Mode already active");
            return Ok(());
        }
        page.js_click(&toggle).await?;
        return wait_until(
            || toggle_is_on(page, &toggle),
            timing.element_timeout,
            timing.poll_interval,
            &format!("mode {} active", name),
        )
        .await;
    };

    let opener = resolver
        .wait_visible(opener, timing.element_timeout, timing.poll_interval)
        .await?;
    if let Some(active) = &mode.active_text {
        let current = page.inner_text(&opener).await?;
        if current.contains(active.as_str()) {
            debug!(mode = name, "Mode already active");
            return Ok(());
        }
    }
    page.click(&opener).await?;
    sleep(UI_PAUSE).await;

    let option = resolver
        .wait_visible(&mode.option, timing.element_timeout, timing.poll_interval)
        .await?;
    page.click(&option).await?;
    sleep(UI_PAUSE).await;
    info!(mode = name, "Mode switched");
    Ok(())
}

/// Toggle reports `data-state="on"`.
async fn toggle_is_on(
    page: &dyn BrowserPage,
    toggle: &ElementHandle,
) -> std::result::Result<bool, PollError> {
    let state = page.attribute(toggle, "data-state").await?;
    Ok(state.as_deref() == Some("on"))
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
