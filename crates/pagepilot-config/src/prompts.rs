//! Prompt discovery in loosely structured input.
//!
//! Callers wrap the prompt list in whatever envelope their pipeline produces
//! (`{json: {prompts}}`, `{items: [...]}`, ...). The list is located by
//! searching the document, then normalized into [`PromptItem`]s.

use serde_json::Value;

use crate::schema::PromptItem;

/// Search depth limit.
pub const MAX_DEPTH: usize = 12;

/// Find the prompt array anywhere in `value`.
pub fn find_prompts(value: &Value) -> Option<&Vec<Value>> {
    find_at(value, 0)
}

fn find_at(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > MAX_DEPTH {
        return None;
    }

    match value {
        Value::Array(items) => {
            if items.first().is_some_and(looks_like_prompt) {
                return Some(items);
            }
            items.iter().find_map(|v| find_at(v, depth + 1))
        }
        Value::Object(map) => {
            let known = [
                &value["prompts"],
                &value["json"]["prompts"],
                &value["data"]["prompts"],
                &value["item"]["json"]["prompts"],
            ];
            if let Some(Value::Array(items)) = known.into_iter().find(|v| v.is_array()) {
                return Some(items);
            }
            if value["items"].is_array() {
                if let Some(found) = find_at(&value["items"], depth + 1) {
                    return Some(found);
                }
            }
            map.values().find_map(|v| find_at(v, depth + 1))
        }
        _ => None,
    }
}

pub(crate) fn looks_like_prompt(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("text") || o.contains_key("index"))
}

/// Normalize raw prompt entries. `index` defaults to position + 1.
pub fn normalize_prompts(raw: &[Value]) -> Vec<PromptItem> {
    raw.iter()
        .enumerate()
        .map(|(i, p)| {
            let position = i as u32 + 1;
            match p {
                Value::String(text) => PromptItem::new(position, text.clone()),
                _ => PromptItem {
                    index: parse_index(&p["index"]).unwrap_or(position),
                    text: value_to_text(&p["text"]),
                    mode: p["mode"].as_str().map(String::from),
                },
            }
        })
        .collect()
}

fn parse_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prompts from `value`: a discovered list, or a single top-level `prompt` string.
pub fn extract_prompts(value: &Value) -> Option<Vec<PromptItem>> {
    if let Some(raw) = find_prompts(value) {
        return Some(normalize_prompts(raw));
    }
    value["prompt"].as_str().map(|text| {
        let mut item = PromptItem::new(1, text);
        item.mode = value["mode"].as_str().map(String::from);
        vec![item]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_prompts() {
        let value = json!({"prompts": [{"text": "a"}, {"text": "b"}]});
        assert_eq!(find_prompts(&value).map(Vec::len), Some(2));
    }

    #[test]
    fn test_known_envelopes() {
        for value in [
            json!({"json": {"prompts": [{"text": "x"}]}}),
            json!({"data": {"prompts": [{"text": "x"}]}}),
            json!({"item": {"json": {"prompts": [{"text": "x"}]}}}),
            json!({"items": [{"json": {"prompts": [{"text": "x"}]}}]}),
        ] {
            assert_eq!(find_prompts(&value).map(Vec::len), Some(1), "{}", value);
        }
    }

    #[test]
    fn test_array_of_prompt_like_objects() {
        let value = json!({"payload": {"list": [{"index": 4}, {"index": 5}]}});
        assert_eq!(find_prompts(&value).map(Vec::len), Some(2));
    }

    #[test]
    fn test_not_found() {
        assert!(find_prompts(&json!({"a": [1, 2, 3], "b": "c"})).is_none());
        assert!(find_prompts(&json!("text")).is_none());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({"prompts": [{"text": "deep"}]});
        for _ in 0..MAX_DEPTH + 1 {
            value = json!({"wrap": value});
        }
        assert!(find_prompts(&value).is_none());

        let mut shallow = json!({"prompts": [{"text": "ok"}]});
        for _ in 0..MAX_DEPTH {
            shallow = json!({"wrap": shallow});
        }
        assert!(find_prompts(&shallow).is_some());
    }

    #[test]
    fn test_normalize_defaults_index() {
        let raw = vec![
            json!({"text": "first"}),
            json!({"index": 7, "text": "second", "mode": "think"}),
            json!({"index": "9", "text": 42}),
            json!("bare"),
            json!({"index": null}),
        ];
        let prompts = normalize_prompts(&raw);
        assert_eq!(prompts[0], PromptItem::new(1, "first"));
        assert_eq!(prompts[1].index, 7);
        assert_eq!(prompts[1].mode.as_deref(), Some("think"));
        assert_eq!(prompts[2].index, 9);
        assert_eq!(prompts[2].text, "42");
        assert_eq!(prompts[3], PromptItem::new(4, "bare"));
        assert_eq!(prompts[4], PromptItem::new(5, ""));
    }

    #[test]
    fn test_extract_single_prompt() {
        let prompts = extract_prompts(&json!({"prompt": "a cat", "mode": "video"})).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].text, "a cat");
        assert_eq!(prompts[0].mode.as_deref(), Some("video"));
    }

    #[test]
    fn test_extract_prefers_list() {
        let prompts =
            extract_prompts(&json!({"prompt": "ignored", "prompts": [{"text": "used"}]})).unwrap();
        assert_eq!(prompts[0].text, "used");
    }
}
