//! Workflow selectors, presets and login checks.

use std::collections::BTreeMap;
use std::str::FromStr;

use pagepilot_protocols::{Selector, SelectorSet};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Selectors for one workflow, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowConfig {
    Chat(ChatSelectors),
    Generation(GenerationSelectors),
}

impl WorkflowConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowConfig::Chat(_) => "chat",
            WorkflowConfig::Generation(_) => "generation",
        }
    }
}

/// Chat-assistant pattern: type, send, wait for a stable answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSelectors {
    /// Prompt input (textarea or contenteditable).
    pub input: SelectorSet,

    /// Send button; Enter is pressed when none is visible.
    #[serde(default)]
    pub send_button: SelectorSet,

    /// Assistant messages, in document order.
    pub message: SelectorSet,

    /// Any visible match means the assistant is still generating.
    #[serde(default)]
    pub busy: SelectorSet,

    /// Popups clicked away before each attempt.
    #[serde(default)]
    pub dismiss: SelectorSet,

    #[serde(default)]
    pub modes: BTreeMap<String, ModeConfig>,
}

/// Media-studio pattern: fill, create, wait for completion, acquire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSelectors {
    pub prompt_input: SelectorSet,

    pub create_button: SelectorSet,

    /// Any rule firing means generation finished.
    pub completion: Vec<CompletionRule>,

    /// Error indicators checked while waiting.
    #[serde(default = "default_error_dialog")]
    pub error_dialog: SelectorSet,

    /// Error text that marks a failed generation. Empty means any visible indicator.
    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,

    /// Element carrying the artifact URL in `src`/`href`.
    #[serde(default)]
    pub artifact: SelectorSet,

    /// Button that makes the browser download the artifact.
    #[serde(default)]
    pub download_button: SelectorSet,

    #[serde(default)]
    pub dismiss: SelectorSet,

    /// `<input type="file">` receiving `image_path`. Usually hidden.
    #[serde(default)]
    pub upload: SelectorSet,

    /// Clicked, when visible, to reveal the file input.
    #[serde(default)]
    pub upload_opener: SelectorSet,

    #[serde(default)]
    pub modes: BTreeMap<String, ModeConfig>,

    /// Completion poll cadence.
    #[serde(default = "default_generation_poll")]
    pub poll_ms: u64,
}

/// A pluggable "generation is done" predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionRule {
    /// A visible element matches.
    ElementAppears { selector: SelectorSet },
    /// More `items` than before the trigger, and `ready` (if set) visible again.
    CountIncreased {
        items: SelectorSet,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ready: Option<SelectorSet>,
    },
}

/// How to activate one named mode.
///
/// Without an `opener`, `option` is a toggle that reports `data-state="on"`
/// when active. With an `opener`, the opener is clicked to reveal `option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener: Option<SelectorSet>,

    pub option: SelectorSet,

    /// Opener text that shows the mode is already active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_text: Option<String>,
}

/// Precondition checked after every (re)connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginCheck {
    /// URL fragments that indicate a sign-in page.
    #[serde(default = "default_login_markers")]
    pub markers: Vec<String>,

    /// Element that only exists for a signed-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<SelectorSet>,
}

impl Default for LoginCheck {
    fn default() -> Self {
        Self {
            markers: default_login_markers(),
            required: None,
        }
    }
}

impl LoginCheck {
    /// Whether `url` looks like a sign-in page.
    pub fn is_login_url(&self, url: &str) -> bool {
        self.markers.iter().any(|m| url.contains(m.as_str()))
    }
}

fn default_login_markers() -> Vec<String> {
    ["accounts.google.com", "signin", "login", "auth0", "auth/"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_error_dialog() -> SelectorSet {
    SelectorSet::from_iter([
        "[role=\"alertdialog\"]",
        "[role=\"alert\"]",
        ".error-message",
        "[data-testid*=\"error\"]",
    ])
}

fn default_error_patterns() -> Vec<String> {
    vec!["生成できませんでした".to_string(), "Could not generate".to_string()]
}

fn default_generation_poll() -> u64 {
    5_000
}

/// Selector bundles for known applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Chatgpt,
    Gemini,
    Flow,
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" => Ok(Preset::Chatgpt),
            "gemini" => Ok(Preset::Gemini),
            "flow" => Ok(Preset::Flow),
            other => Err(ConfigError::InvalidValue {
                field: "preset".to_string(),
                message: format!("unknown preset '{}' (expected chatgpt, gemini or flow)", other),
            }),
        }
    }
}

impl Preset {
    pub fn home_url(&self) -> &'static str {
        match self {
            Preset::Chatgpt => "https://chatgpt.com/",
            Preset::Gemini => "https://gemini.google.com/app",
            Preset::Flow => "https://labs.google/fx/tools/flow",
        }
    }

    /// Element present only when signed in.
    pub fn ready_element(&self) -> Option<SelectorSet> {
        match self {
            Preset::Chatgpt => Some(SelectorSet::single("#prompt-textarea")),
            Preset::Gemini => Some(SelectorSet::single("div[role=\"textbox\"]")),
            Preset::Flow => None,
        }
    }

    pub fn workflow(&self) -> WorkflowConfig {
        match self {
            Preset::Chatgpt => WorkflowConfig::Chat(ChatSelectors {
                input: SelectorSet::single("#prompt-textarea"),
                send_button: SelectorSet::single("#composer-submit-button"),
                message: SelectorSet::single("[data-message-author-role=\"assistant\"]"),
                busy: SelectorSet::single("[data-testid=\"stop-button\"]"),
                dismiss: SelectorSet::default(),
                modes: BTreeMap::new(),
            }),
            Preset::Gemini => {
                let mut modes = BTreeMap::new();
                for (name, label) in [("fast", "高速モード"), ("think", "思考モード")] {
                    modes.insert(
                        name.to_string(),
                        ModeConfig {
                            opener: Some(SelectorSet::from_iter([
                                "button.input-area-switch",
                                ".input-area-switch",
                            ])),
                            option: SelectorSet::single(format!(
                                "[data-test-id=\"bard-mode-option-{}\"]",
                                label
                            )),
                            active_text: Some(label.to_string()),
                        },
                    );
                }
                WorkflowConfig::Chat(ChatSelectors {
                    input: SelectorSet::single("div[role=\"textbox\"]"),
                    send_button: SelectorSet::from_iter([
                        "button[aria-label=\"送信\"]",
                        "button[aria-label=\"Send message\"]",
                    ]),
                    message: SelectorSet::single(".markdown"),
                    busy: SelectorSet::from_iter([
                        "button[aria-label*=\"停止\"]",
                        "button[aria-label*=\"Stop\"]",
                        "mat-spinner",
                        ".loading-spinner",
                        "[role=\"progressbar\"]",
                        "mat-progress-spinner",
                    ]),
                    dismiss: SelectorSet::default(),
                    modes,
                })
            }
            Preset::Flow => {
                let mut modes = BTreeMap::new();
                modes.insert(
                    "video".to_string(),
                    ModeConfig {
                        opener: None,
                        option: SelectorSet::new(vec![Selector::text(
                            "button[role=\"radio\"]",
                            "videocam",
                        )]),
                        active_text: None,
                    },
                );
                modes.insert(
                    "image".to_string(),
                    ModeConfig {
                        opener: None,
                        option: SelectorSet::new(vec![Selector::text(
                            "button[role=\"radio\"]",
                            "image",
                        )]),
                        active_text: None,
                    },
                );
                WorkflowConfig::Generation(GenerationSelectors {
                    prompt_input: SelectorSet::single("#PINHOLE_TEXT_AREA_ELEMENT_ID"),
                    create_button: SelectorSet::new(vec![
                        Selector::css("button[aria-label=\"作成\"]"),
                        Selector::text("button", "arrow_forward"),
                    ]),
                    completion: vec![
                        CompletionRule::ElementAppears {
                            selector: SelectorSet::new(vec![
                                Selector::text("button", "シーンに追加"),
                                Selector::text("button", "Add to scene"),
                            ]),
                        },
                        CompletionRule::CountIncreased {
                            items: SelectorSet::single("video"),
                            ready: Some(SelectorSet::single("#PINHOLE_ADD_CLIP_CARD_ID")),
                        },
                    ],
                    error_dialog: default_error_dialog(),
                    error_patterns: default_error_patterns(),
                    artifact: SelectorSet::single("video"),
                    download_button: SelectorSet::new(vec![Selector::text("button", "download")]),
                    dismiss: SelectorSet::new(vec![
                        Selector::text("button", "同意する"),
                        Selector::text("button", "同意"),
                        Selector::text("button", "I agree"),
                        Selector::text("button", "Accept"),
                    ]),
                    upload: SelectorSet::single("input[type=\"file\"]"),
                    upload_opener: SelectorSet::new(vec![Selector::text("button", "add")]),
                    modes,
                    poll_ms: default_generation_poll(),
                })
            }
        }
    }
}
