//! Trusted mouse and keyboard input.

use serde_json::{json, Value};
use tracing::debug;

use crate::cdp::error::CdpError;
use crate::cdp::protocol::{KeyEventType, MouseButton, MouseEventType};

use super::core::PageSession;

const MOD_ALT: i32 = 1;
const MOD_CTRL: i32 = 2;
const MOD_META: i32 = 4;
const MOD_SHIFT: i32 = 8;

/// A parsed key spec such as `Enter`, `a` or `Control+a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyStroke {
    pub key: String,
    pub modifiers: i32,
    pub code: i64,
    /// Character inserted by the key, if any.
    pub text: Option<String>,
}

impl KeyStroke {
    pub(crate) fn parse(spec: &str) -> Self {
        // A lone "+" is the plus key, not a separator.
        let (mods, key) = match spec.rsplit_once('+') {
            Some((mods, key)) if !key.is_empty() => (mods, key),
            _ => ("", spec),
        };
        let modifiers = mods
            .split('+')
            .filter(|m| !m.is_empty())
            .fold(0, |acc, m| acc | Self::modifier_flag(m));

        let (code, text) = Self::virtual_key(key);
        // Accelerators insert nothing.
        let text = if modifiers & (MOD_ALT | MOD_CTRL | MOD_META) != 0 {
            None
        } else {
            text
        };

        Self {
            key: key.to_string(),
            modifiers,
            code,
            text,
        }
    }

    fn modifier_flag(name: &str) -> i32 {
        match name.to_ascii_lowercase().as_str() {
            "alt" | "option" => MOD_ALT,
            "control" | "ctrl" => MOD_CTRL,
            "meta" | "command" | "cmd" => MOD_META,
            "shift" => MOD_SHIFT,
            _ => 0,
        }
    }

    fn virtual_key(key: &str) -> (i64, Option<String>) {
        let code = match key {
            "Enter" => return (13, Some("\r".to_string())),
            "Backspace" => 8,
            "Tab" => 9,
            "Escape" => 27,
            "ArrowLeft" => 37,
            "ArrowUp" => 38,
            "ArrowRight" => 39,
            "ArrowDown" => 40,
            "Delete" => 46,
            _ => {
                let mut chars = key.chars();
                return match (chars.next(), chars.next()) {
                    (Some(c), None) => (c.to_ascii_uppercase() as i64, Some(c.to_string())),
                    _ => (0, None),
                };
            }
        };
        (code, None)
    }

    /// `Ctrl/Cmd+A` needs the editing command, the key event alone does nothing.
    fn commands(&self) -> Option<Value> {
        let select_all =
            self.modifiers & (MOD_CTRL | MOD_META) != 0 && self.key.eq_ignore_ascii_case("a");
        select_all.then(|| json!(["selectAll"]))
    }

    fn key_down(&self) -> Value {
        let kind = if self.text.is_some() {
            KeyEventType::KeyDown
        } else {
            KeyEventType::RawKeyDown
        };
        let mut params = self.event(kind);
        if let Some(text) = &self.text {
            params["text"] = json!(text);
        }
        if let Some(commands) = self.commands() {
            params["commands"] = commands;
        }
        params
    }

    fn event(&self, kind: KeyEventType) -> Value {
        json!({
            "type": kind,
            "key": self.key,
            "windowsVirtualKeyCode": self.code,
            "modifiers": self.modifiers,
        })
    }
}

impl PageSession {
    /// Left click at viewport coordinates, with a preceding mouse move.
    pub async fn click(&self, x: f64, y: f64) -> Result<(), CdpError> {
        let steps = [
            (MouseEventType::MouseMoved, MouseButton::None, 0),
            (MouseEventType::MousePressed, MouseButton::Left, 1),
            (MouseEventType::MouseReleased, MouseButton::Left, 1),
        ];
        for (kind, button, clicks) in steps {
            self.call(
                "Input.dispatchMouseEvent",
                Some(json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": button,
                    "clickCount": clicks,
                })),
            )
            .await?;
        }
        debug!(x, y, "Mouse click");
        Ok(())
    }

    /// Insert text at the focused element as if typed.
    pub async fn type_text(&self, text: &str) -> Result<(), CdpError> {
        self.call("Input.insertText", Some(json!({ "text": text })))
            .await?;
        debug!(chars = text.chars().count(), "Inserted text");
        Ok(())
    }

    /// Press and release a key spec such as `Enter` or `Control+a`.
    pub async fn press_key(&self, spec: &str) -> Result<(), CdpError> {
        let stroke = KeyStroke::parse(spec);
        self.call("Input.dispatchKeyEvent", Some(stroke.key_down()))
            .await?;
        self.call(
            "Input.dispatchKeyEvent",
            Some(stroke.event(KeyEventType::KeyUp)),
        )
        .await?;
        Ok(())
    }
}
