//! Configuration validation.

use std::collections::HashSet;

use pagepilot_protocols::SelectorSet;

use crate::error::ConfigError;
use crate::schema::{CompletionRule, Strategy, TaskConfig, WorkflowConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// The first error as a [`ConfigError`], or the warnings if valid.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(e) => Err(ConfigError::InvalidValue {
                field: e.path,
                message: e.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration before any browser interaction.
    pub fn validate(config: &TaskConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_endpoints(config, &mut result);
        Self::validate_timing(config, &mut result);
        Self::validate_prompts(config, &mut result);
        Self::validate_workflow(config, &mut result);
        Self::validate_acquisition(config, &mut result);

        result
    }

    fn validate_endpoints(config: &TaskConfig, result: &mut ValidationResult) {
        if !is_http_url(&config.cdp_url) {
            result.add_error(ValidationError::new(
                "cdp_url",
                "cdp_url must start with http:// or https://",
            ));
        }

        match config.resolved_goto_url() {
            None => result.add_error(ValidationError::new(
                "goto_url",
                "No target URL: set goto_url or a preset",
            )),
            Some(url) if !is_http_url(&url) => result.add_error(ValidationError::new(
                "goto_url",
                "goto_url must start with http:// or https://",
            )),
            Some(_) => {}
        }
    }

    fn validate_timing(config: &TaskConfig, result: &mut ValidationResult) {
        let required = [
            ("global_timeout_ms", config.global_timeout_ms),
            ("answer_wait_ms", config.answer_wait_ms),
            ("wait_timeout_ms", config.wait_timeout_ms),
            ("element_timeout_ms", config.element_timeout_ms),
            ("poll_interval_ms", config.poll_interval_ms),
        ];
        for (path, value) in required {
            if value == 0 {
                result.add_error(ValidationError::new(path, format!("{} must be greater than 0", path)));
            }
        }

        if config.max_retries == 0 {
            result.add_error(ValidationError::new(
                "max_retries",
                "max_retries must be at least 1",
            ));
        }
        if config.max_retries > 10 {
            result.add_warning(ValidationWarning::new(
                "max_retries",
                "max_retries is very high (>10), a failing task may run for a long time",
            ));
        }

        if config.reconnect_attempts == 0 {
            result.add_error(ValidationError::new(
                "reconnect_attempts",
                "reconnect_attempts must be at least 1",
            ));
        }

        if config.stabilize_ms >= config.answer_wait_ms {
            result.add_warning(ValidationWarning::new(
                "stabilize_ms",
                "stabilize_ms is not shorter than answer_wait_ms; answers can never stabilize in time",
            ));
        }

        if config.poll_interval_ms > config.element_timeout_ms {
            result.add_warning(ValidationWarning::new(
                "poll_interval_ms",
                "poll_interval_ms exceeds element_timeout_ms; element waits poll only once",
            ));
        }
    }

    fn validate_prompts(config: &TaskConfig, result: &mut ValidationResult) {
        if config.prompts.iter().all(|p| p.text.trim().is_empty()) {
            result.add_warning(ValidationWarning::new(
                "prompts",
                "Every prompt is empty; all tasks will be skipped",
            ));
        }

        let mut seen = HashSet::new();
        for prompt in &config.prompts {
            if !seen.insert(prompt.index) {
                result.add_warning(ValidationWarning::new(
                    "prompts",
                    format!("Duplicate prompt index {}; later results overwrite earlier ones", prompt.index),
                ));
            }
        }
    }

    fn validate_workflow(config: &TaskConfig, result: &mut ValidationResult) {
        let Some(workflow) = config.resolved_workflow() else {
            result.add_error(ValidationError::new(
                "workflow",
                "No workflow selectors: set workflow or a preset",
            ));
            return;
        };

        let modes = match &workflow {
            WorkflowConfig::Chat(chat) => {
                require_selectors(result, "workflow.input", &chat.input);
                require_selectors(result, "workflow.message", &chat.message);
                &chat.modes
            }
            WorkflowConfig::Generation(generation) => {
                require_selectors(result, "workflow.prompt_input", &generation.prompt_input);
                require_selectors(result, "workflow.create_button", &generation.create_button);

                if generation.completion.is_empty() {
                    result.add_error(ValidationError::new(
                        "workflow.completion",
                        "At least one completion rule is required",
                    ));
                }
                for rule in &generation.completion {
                    match rule {
                        CompletionRule::ElementAppears { selector } => {
                            require_selectors(result, "workflow.completion.selector", selector);
                        }
                        CompletionRule::CountIncreased { items, .. } => {
                            require_selectors(result, "workflow.completion.items", items);
                        }
                    }
                }

                if config.image_path.is_some() && generation.upload.is_empty() {
                    result.add_error(ValidationError::new(
                        "workflow.upload",
                        "image_path is set but no upload selector is configured",
                    ));
                }
                if config.download && config.output_path.is_none() {
                    result.add_error(ValidationError::new(
                        "output_path",
                        "output_path is required when download is enabled",
                    ));
                }
                if config.download {
                    let strategies = &config.acquisition.strategies;
                    if strategies.contains(&Strategy::Direct) && generation.artifact.is_empty() {
                        result.add_warning(ValidationWarning::new(
                            "workflow.artifact",
                            "direct strategy enabled but no artifact selector configured",
                        ));
                    }
                    if strategies.contains(&Strategy::ClickDownload)
                        && generation.download_button.is_empty()
                    {
                        result.add_warning(ValidationWarning::new(
                            "workflow.download_button",
                            "click_download strategy enabled but no download button configured",
                        ));
                    }
                }
                &generation.modes
            }
        };

        if !config.skip_mode_switch {
            let requested = config
                .mode
                .iter()
                .chain(config.prompts.iter().filter_map(|p| p.mode.as_ref()));
            for mode in requested {
                if !modes.contains_key(mode) {
                    result.add_warning(ValidationWarning::new(
                        "mode",
                        format!("Mode '{}' is not defined for this workflow and will be ignored", mode),
                    ));
                }
            }
        }
    }

    fn validate_acquisition(config: &TaskConfig, result: &mut ValidationResult) {
        let acquisition = &config.acquisition;

        if config.download && acquisition.strategies.is_empty() {
            result.add_error(ValidationError::new(
                "acquisition.strategies",
                "At least one acquisition strategy is required when download is enabled",
            ));
        }

        if let Err(e) = regex::RegexBuilder::new(&acquisition.scan_name_pattern)
            .case_insensitive(true)
            .build()
        {
            result.add_error(ValidationError::new(
                "acquisition.scan_name_pattern",
                format!("Invalid regex: {}", e),
            ));
        }

        if acquisition.strategies.contains(&Strategy::FilesystemScan) {
            for dir in &acquisition.scan_dirs {
                if !dir.exists() {
                    result.add_warning(ValidationWarning::new(
                        "acquisition.scan_dirs",
                        format!("Scan directory does not exist: {:?}", dir),
                    ));
                }
            }
        }
    }
}

fn require_selectors(result: &mut ValidationResult, path: &str, set: &SelectorSet) {
    if set.is_empty() {
        result.add_error(ValidationError::new(path, "At least one selector is required"));
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
