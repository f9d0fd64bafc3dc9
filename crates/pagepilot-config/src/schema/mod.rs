//! Task configuration schema.
//!
//! Field names are snake_case; the camelCase spellings accepted by older
//! callers (`outputPath`, `waitTimeout`, `cdpUrl`, ...) are kept as aliases.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod schema_acquire;
mod schema_workflow;

pub use schema_acquire::*;
pub use schema_workflow::*;

pub(crate) fn default_true() -> bool {
    true
}

/// One unit of work: a prompt to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptItem {
    /// 1-based position used in result keys (`result_p{index}`).
    pub index: u32,
    pub text: String,
    /// Per-prompt mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl PromptItem {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            mode: None,
        }
    }

    /// Key under which this prompt's result is reported.
    pub fn result_key(&self) -> String {
        format!("result_p{}", self.index)
    }
}

/// Read-only record built once per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Filled by prompt discovery, not by field deserialization.
    #[serde(default, skip_deserializing)]
    pub prompts: Vec<PromptItem>,

    /// Named selector bundle for a known application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,

    /// Explicit workflow selectors; takes precedence over `preset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowConfig>,

    /// Mode applied before every prompt without its own `mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Application-specific variant (e.g. aspect ratio).
    #[serde(default, alias = "aspectRatio", skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    #[serde(default = "default_cdp_url", alias = "cdpUrl", alias = "cdp")]
    pub cdp_url: String,

    #[serde(default, alias = "gotoUrl", alias = "goto", alias = "projectUrl")]
    pub goto_url: Option<String>,

    /// Element waits and idle checks.
    #[serde(default = "default_global_timeout", alias = "globalTimeout", alias = "timeout")]
    pub global_timeout_ms: u64,

    /// Chat answer wait.
    #[serde(default = "default_answer_wait", alias = "answerWait")]
    pub answer_wait_ms: u64,

    /// Generation completion wait.
    #[serde(default = "default_wait_timeout", alias = "waitTimeout")]
    pub wait_timeout_ms: u64,

    /// Stability window for streamed answers.
    #[serde(default = "default_stabilize", alias = "stabilizeMs", alias = "stabilize")]
    pub stabilize_ms: u64,

    /// Short waits such as "button becomes enabled".
    #[serde(default = "default_element_timeout")]
    pub element_timeout_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after navigation before touching the page.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    #[serde(default = "default_inter_task_delay", alias = "sceneDelay")]
    pub inter_task_delay_ms: u64,

    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay", alias = "retryDelay")]
    pub retry_delay_ms: u64,

    /// Attempts for reconnect-and-retry of a single page operation.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default, alias = "outputPath")]
    pub output_path: Option<PathBuf>,

    /// Start-frame image uploaded before the prompt is filled.
    #[serde(default, alias = "imagePath")]
    pub image_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub download: bool,

    #[serde(default = "default_true", alias = "keepAudio")]
    pub keep_audio: bool,

    /// Diagnostic screenshot on failure.
    #[serde(default = "default_true")]
    pub screenshot: bool,

    #[serde(default, alias = "screenshotPath")]
    pub screenshot_path: Option<PathBuf>,

    #[serde(default, alias = "noModeSwitch")]
    pub skip_mode_switch: bool,

    #[serde(default)]
    pub login: LoginCheck,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            prompts: Vec::new(),
            preset: None,
            workflow: None,
            mode: None,
            variant: None,
            cdp_url: default_cdp_url(),
            goto_url: None,
            global_timeout_ms: default_global_timeout(),
            answer_wait_ms: default_answer_wait(),
            wait_timeout_ms: default_wait_timeout(),
            stabilize_ms: default_stabilize(),
            element_timeout_ms: default_element_timeout(),
            poll_interval_ms: default_poll_interval(),
            settle_ms: default_settle(),
            inter_task_delay_ms: default_inter_task_delay(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            reconnect_attempts: default_reconnect_attempts(),
            output_path: None,
            image_path: None,
            download: true,
            keep_audio: true,
            screenshot: true,
            screenshot_path: None,
            skip_mode_switch: false,
            login: LoginCheck::default(),
            acquisition: AcquisitionConfig::default(),
            transcode: TranscodeConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Workflow selectors: explicit `workflow`, else the preset's bundle.
    pub fn resolved_workflow(&self) -> Option<WorkflowConfig> {
        self.workflow
            .clone()
            .or_else(|| self.preset.map(|p| p.workflow()))
    }

    /// Target URL: explicit `goto_url`, else the preset's home page.
    pub fn resolved_goto_url(&self) -> Option<String> {
        self.goto_url
            .clone()
            .or_else(|| self.preset.map(|p| p.home_url().to_string()))
    }

    /// Effective login check, with the preset's ready element if none is configured.
    pub fn resolved_login(&self) -> LoginCheck {
        let mut login = self.login.clone();
        if login.required.is_none() {
            login.required = self.preset.and_then(|p| p.ready_element());
        }
        login
    }
}

fn default_cdp_url() -> String {
    "http://localhost:9222".to_string()
}

fn default_global_timeout() -> u64 {
    180_000
}

fn default_answer_wait() -> u64 {
    300_000
}

fn default_wait_timeout() -> u64 {
    600_000
}

fn default_stabilize() -> u64 {
    6_000
}

fn default_element_timeout() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_settle() -> u64 {
    3_000
}

fn default_inter_task_delay() -> u64 {
    800
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    10_000
}

fn default_reconnect_attempts() -> u32 {
    3
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
