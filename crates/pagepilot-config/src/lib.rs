//! # pagepilot config
//!
//! Task configuration: schema with serde defaults, selector presets, the
//! loader (inline, file or base64 input with prompt discovery), and the
//! validator that runs before any browser interaction.

mod error;
mod loader;
mod prompts;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::{ConfigLoader, InputSource};
pub use prompts::{extract_prompts, find_prompts, normalize_prompts};
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
