//! Media-studio workflow: fill, create, wait for completion, acquire.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_config::{GenerationSelectors, PromptItem};
use pagepilot_protocols::{BrowserPage, ElementHandle};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::completion::{build_signals, CompletionSignal};
use super::{apply_mode, prepare_page, requested_mode, StepTiming, Workflow};
use crate::artifact::{AcquireRequest, ArtifactAcquirer};
use crate::error::{AutomationError, Result};
use crate::result::TaskOutput;
use crate::selector::SelectorResolver;
use crate::session::SessionManager;
use crate::wait::{wait_for, PollError};

/// Run-level switches for generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub mode: Option<String>,
    /// Applied like a mode when the selectors define it.
    pub variant: Option<String>,
    pub skip_mode_switch: bool,
    /// Acquire the artifact; otherwise report the page URL.
    pub download: bool,
    pub output_path: Option<PathBuf>,
    /// Suffix output files with `_p{index}`.
    pub multiple_prompts: bool,
    /// Start-frame image set on the upload input before the prompt.
    pub image_path: Option<PathBuf>,
}

pub struct GenerationWorkflow {
    selectors: GenerationSelectors,
    timing: StepTiming,
    options: GenerationOptions,
    acquirer: Arc<ArtifactAcquirer>,
}

impl GenerationWorkflow {
    pub fn new(
        selectors: GenerationSelectors,
        timing: StepTiming,
        options: GenerationOptions,
        acquirer: Arc<ArtifactAcquirer>,
    ) -> Self {
        Self {
            selectors,
            timing,
            options,
            acquirer,
        }
    }

    async fn switch_modes(&self, page: &dyn BrowserPage, task: &PromptItem) -> Result<()> {
        let modes = &self.selectors.modes;
        let skip = self.options.skip_mode_switch;

        if let Some(mode) = requested_mode(task, self.options.mode.as_deref(), skip) {
            apply_mode(page, modes, mode, &self.timing).await?;
        }
        if let Some(variant) = self.options.variant.as_deref().filter(|_| !skip) {
            if modes.contains_key(variant) {
                apply_mode(page, modes, variant, &self.timing).await?;
            } else {
                debug!(variant, "No selectors for variant");
            }
        }
        Ok(())
    }

    /// Reveal the file input if needed and attach the start-frame image.
    async fn upload_image(&self, page: &dyn BrowserPage, image: &Path) -> Result<()> {
        if self.selectors.upload.is_empty() {
            return Err(AutomationError::Configuration(
                "image_path is set but no upload selector is configured".to_string(),
            ));
        }
        if !tokio::fs::try_exists(image).await.unwrap_or(false) {
            return Err(AutomationError::Configuration(format!(
                "image not found: {}",
                image.display()
            )));
        }

        let resolver = SelectorResolver::new(page);
        let timing = &self.timing;
        if let Some(opener) = resolver.find_visible(&self.selectors.upload_opener).await? {
            page.js_click(&opener).await?;
            sleep(timing.poll_interval).await;
        }
        let input = resolver
            .wait_attached(&self.selectors.upload, timing.element_timeout, timing.poll_interval)
            .await?;
        page.set_input_files(&input, &[image.to_path_buf()]).await?;
        info!(image = %image.display(), "Start frame uploaded");
        Ok(())
    }

    /// Text of a visible error indicator that matches the error patterns.
    async fn application_error(&self, page: &dyn BrowserPage) -> Result<Option<String>> {
        if self.selectors.error_dialog.is_empty() {
            return Ok(None);
        }
        let patterns = &self.selectors.error_patterns;
        for element in SelectorResolver::new(page)
            .find_all_visible(&self.selectors.error_dialog)
            .await?
        {
            let text = match page.inner_text(&element).await {
                Ok(text) => text,
                Err(e) if e.is_disconnect() => return Err(e.into()),
                Err(_) => continue,
            };
            let text = text.trim();
            if patterns.is_empty() || patterns.iter().any(|p| text.contains(p.as_str())) {
                let message = if text.is_empty() {
                    format!("error indicator visible: {}", element.selector)
                } else {
                    text.to_string()
                };
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    async fn completion_check(
        &self,
        page: &dyn BrowserPage,
        signals: &[Box<dyn CompletionSignal>],
    ) -> std::result::Result<Option<Option<ElementHandle>>, PollError> {
        if let Some(message) = self.application_error(page).await? {
            warn!(%message, "Application reported a failed generation");
            return Err(PollError::Fatal(AutomationError::Application(message)));
        }
        for signal in signals {
            if let Some(hint) = signal.check(page).await? {
                debug!(signal = signal.name(), "Completion signal fired");
                return Ok(Some(hint));
            }
        }
        Ok(None)
    }

    fn output_path_for(&self, task: &PromptItem) -> Result<PathBuf> {
        let base = self.options.output_path.as_ref().ok_or_else(|| {
            AutomationError::Configuration("output_path is required when download is on".to_string())
        })?;
        Ok(if self.options.multiple_prompts {
            indexed_output_path(base, task.index)
        } else {
            base.clone()
        })
    }
}

/// `dir/name.ext` becomes `dir/name_p{index}.ext`.
pub(crate) fn indexed_output_path(base: &Path, index: u32) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match base.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_p{}.{}", stem, index, ext),
        None => format!("{}_p{}", stem, index),
    };
    base.with_file_name(name)
}

#[async_trait]
impl Workflow for GenerationWorkflow {
    fn name(&self) -> &str {
        "generation"
    }

    async fn prepare(&self, session: &mut SessionManager, attempt: u32) -> Result<()> {
        prepare_page(session, attempt, &self.selectors.dismiss, &self.timing).await
    }

    async fn execute(&self, session: &mut SessionManager, task: &PromptItem) -> Result<TaskOutput> {
        let page = session.page()?;
        let page = page.as_ref();
        let resolver = SelectorResolver::new(page);
        let timing = &self.timing;

        let output_path = if self.options.download {
            Some(self.output_path_for(task)?)
        } else {
            None
        };

        self.switch_modes(page, task).await?;
        if let Some(image) = &self.options.image_path {
            self.upload_image(page, image).await?;
        }

        let mut signals = build_signals(&self.selectors.completion);
        for signal in signals.iter_mut() {
            signal.arm(page).await?;
        }

        let input = resolver
            .wait_visible(&self.selectors.prompt_input, timing.element_timeout, timing.poll_interval)
            .await?;
        page.fill(&input, &task.text).await?;

        let requests_before: HashSet<String> = page.observed_requests().into_iter().collect();
        let create = resolver
            .wait_enabled(&self.selectors.create_button, timing.element_timeout, timing.poll_interval)
            .await?;
        page.click(&create).await?;
        info!(index = task.index, "Generation started");

        let signals = signals.as_slice();
        let hint = wait_for(
            || self.completion_check(page, signals),
            timing.generation_timeout,
            Duration::from_millis(self.selectors.poll_ms.max(1)),
            "generation complete",
        )
        .await?;
        info!(index = task.index, "Generation complete");

        let Some(output_path) = output_path else {
            let url = page.current_url().await?;
            return Ok(TaskOutput::Url { url });
        };

        let request = AcquireRequest {
            hint,
            artifact: self.selectors.artifact.clone(),
            download_button: self.selectors.download_button.clone(),
            requests_before,
            output_path,
        };
        let artifact = self.acquirer.acquire(page, &request).await?;
        Ok(TaskOutput::File(artifact))
    }
}

#[cfg(test)]
#[path = "generation_tests.rs"]
mod tests;
