//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde_json::Value;

use crate::error::ConfigError;
use crate::prompts::{extract_prompts, looks_like_prompt};
use crate::schema::TaskConfig;

/// Keys holding prompt content, never env-expanded.
const PROMPT_KEYS: [&str; 2] = ["prompt", "prompts"];

/// How the positional input argument is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSource {
    /// The argument is the document itself.
    #[default]
    Inline,
    /// The argument is a path to a JSON or TOML file.
    File,
    /// The argument is base64-encoded JSON.
    Base64,
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a task configuration from the CLI input argument.
    pub fn load_input(input: &str, source: InputSource) -> Result<TaskConfig, ConfigError> {
        match source {
            InputSource::Inline => Self::load_str(input),
            InputSource::File => Self::load(Path::new(input)),
            InputSource::Base64 => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(input.trim())
                    .map_err(|e| ConfigError::Base64(e.to_string()))?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| ConfigError::Base64(e.to_string()))?;
                Self::load_str(&text)
            }
        }
    }

    /// Load configuration from a file; `.toml` files are TOML, everything else JSON.
    pub fn load(path: &Path) -> Result<TaskConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let value = if is_toml {
            let table: toml::Value = toml::from_str(&content)?;
            serde_json::to_value(table)?
        } else {
            serde_json::from_str(&content)?
        };
        Self::from_value(value)
    }

    /// Load configuration from a JSON string.
    pub fn load_str(content: &str) -> Result<TaskConfig, ConfigError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// Build a config from a parsed document, discovering prompts anywhere in it.
    ///
    /// `${VAR}` references are expanded in config string values only; prompt
    /// text is user content and is taken literally.
    pub fn from_value(mut value: Value) -> Result<TaskConfig, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::InvalidFormat(
                "expected a JSON object at the top level".to_string(),
            ));
        }

        let prompts = extract_prompts(&value).ok_or(ConfigError::PromptsNotFound)?;
        Self::expand_env_in(&mut value)?;
        let mut config: TaskConfig = serde_json::from_value(value)?;
        config.prompts = prompts;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Expand `${VAR}` in every string leaf, skipping prompt content.
    fn expand_env_in(value: &mut Value) -> Result<(), ConfigError> {
        match value {
            Value::String(s) if s.contains("${") => {
                *s = Self::expand_env_vars(s)?;
            }
            Value::Array(items) => {
                if items.first().is_some_and(looks_like_prompt) {
                    return Ok(());
                }
                for item in items {
                    Self::expand_env_in(item)?;
                }
            }
            Value::Object(map) => {
                for (key, item) in map.iter_mut() {
                    if PROMPT_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    Self::expand_env_in(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(config: &mut TaskConfig) {
        let expand = |p: &PathBuf| PathBuf::from(Self::expand_path(&p.to_string_lossy()));
        config.output_path = config.output_path.as_ref().map(expand);
        config.image_path = config.image_path.as_ref().map(expand);
        config.screenshot_path = config.screenshot_path.as_ref().map(expand);
        config.acquisition.scan_dirs = config.acquisition.scan_dirs.iter().map(expand).collect();
    }

    /// Expand shell-style paths (e.g., `~/Downloads`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}
