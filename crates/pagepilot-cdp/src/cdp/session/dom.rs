//! DOM operations for CDP page session.
//!
//! Elements are addressed by `backendNodeId`: unlike `nodeId` it survives
//! repeated `DOM.getDocument` calls, so a handle stays valid for as long as
//! the node lives.

use serde_json::{json, Value};

use crate::cdp::error::{CdpError, SERVER_ERROR};
use crate::cdp::protocol::{BoxModel, RemoteObject};

use super::core::PageSession;

const STATE_FN: &str = r#"function() {
    const s = window.getComputedStyle(this);
    return {
        display: s.display,
        visibility: s.visibility,
        disabled: !!this.disabled || this.getAttribute('aria-disabled') === 'true'
    };
}"#;

const TEXT_FN: &str = "function() { return this.innerText ?? this.textContent ?? ''; }";

const ATTRIBUTE_FN: &str = "function(name) { return this.getAttribute(name); }";

const CLICK_FN: &str = "function() { this.click(); }";

/// Style half of an element's state.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NodeStyle {
    pub display: String,
    pub visibility: String,
    pub disabled: bool,
}

impl PageSession {
    /// Root node id of the current document.
    async fn document_node_id(&self) -> Result<i64, CdpError> {
        let result = self
            .call("DOM.getDocument", Some(json!({"depth": 0})))
            .await?;
        result["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| CdpError::InvalidResponse("Missing root nodeId".to_string()))
    }

    /// Query selector all, returning backend node ids in document order.
    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<i64>, CdpError> {
        let root = self.document_node_id().await?;

        let result = self
            .call(
                "DOM.querySelectorAll",
                Some(json!({
                    "nodeId": root,
                    "selector": selector,
                })),
            )
            .await?;

        let node_ids: Vec<i64> = result["nodeIds"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default();

        let mut backend_ids = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let described = self
                .call("DOM.describeNode", Some(json!({"nodeId": node_id})))
                .await?;
            if let Some(id) = described["node"]["backendNodeId"].as_i64() {
                backend_ids.push(id);
            }
        }

        Ok(backend_ids)
    }

    /// Get box model for node. `None` when the node is not rendered.
    pub async fn get_box_model(&self, backend_id: i64) -> Result<Option<BoxModel>, CdpError> {
        let result = self
            .call(
                "DOM.getBoxModel",
                Some(json!({"backendNodeId": backend_id})),
            )
            .await;

        match result {
            Ok(r) => {
                let model: BoxModel = serde_json::from_value(r["model"].clone())?;
                Ok(Some(model))
            }
            Err(e) if e.is_stale_node() => Err(e),
            Err(CdpError::Protocol {
                code: SERVER_ERROR, ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve node to runtime object.
    pub async fn resolve_node(&self, backend_id: i64) -> Result<RemoteObject, CdpError> {
        let result = self
            .call(
                "DOM.resolveNode",
                Some(json!({"backendNodeId": backend_id})),
            )
            .await?;

        let obj: RemoteObject = serde_json::from_value(result["object"].clone())?;
        Ok(obj)
    }

    /// Run `function` with the node bound to `this`.
    pub async fn call_on_node(
        &self,
        backend_id: i64,
        function: &str,
        args: Option<Vec<Value>>,
    ) -> Result<Value, CdpError> {
        let object = self.resolve_node(backend_id).await?;
        let object_id = object
            .object_id
            .ok_or_else(|| CdpError::InvalidResponse("Node has no objectId".to_string()))?;
        self.call_function_on(&object_id, function, args).await
    }

    pub async fn node_style(&self, backend_id: i64) -> Result<NodeStyle, CdpError> {
        let value = self.call_on_node(backend_id, STATE_FN, None).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub async fn inner_text(&self, backend_id: i64) -> Result<String, CdpError> {
        let value = self.call_on_node(backend_id, TEXT_FN, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn attribute(&self, backend_id: i64, name: &str) -> Result<Option<String>, CdpError> {
        let value = self
            .call_on_node(backend_id, ATTRIBUTE_FN, Some(vec![json!(name)]))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    /// Focus element.
    pub async fn focus(&self, backend_id: i64) -> Result<(), CdpError> {
        self.call("DOM.focus", Some(json!({"backendNodeId": backend_id})))
            .await?;
        Ok(())
    }

    pub async fn scroll_into_view(&self, backend_id: i64) -> Result<(), CdpError> {
        self.call(
            "DOM.scrollIntoViewIfNeeded",
            Some(json!({"backendNodeId": backend_id})),
        )
        .await?;
        Ok(())
    }

    /// Trusted click at the center of the node's content quad.
    pub async fn click_node(&self, backend_id: i64) -> Result<(), CdpError> {
        self.scroll_into_view(backend_id).await?;

        let box_model = self
            .get_box_model(backend_id)
            .await?
            .ok_or_else(|| CdpError::InvalidResponse("Element has no layout box".to_string()))?;

        let (x, y) = Self::quad_center(&box_model.content);
        self.click(x, y).await
    }

    /// `element.click()` from script.
    pub async fn js_click_node(&self, backend_id: i64) -> Result<(), CdpError> {
        self.call_on_node(backend_id, CLICK_FN, None).await?;
        Ok(())
    }

    /// Set the selected files of a file input. Paths must be absolute.
    pub async fn set_file_input_files(&self, backend_id: i64, files: &[String]) -> Result<(), CdpError> {
        self.call(
            "DOM.setFileInputFiles",
            Some(json!({"files": files, "backendNodeId": backend_id})),
        )
        .await?;
        Ok(())
    }

    /// Replace the node's content with `value`.
    pub async fn fill(&self, backend_id: i64, value: &str) -> Result<(), CdpError> {
        self.focus(backend_id).await?;
        self.press_key("Control+a").await?;
        if value.is_empty() {
            self.press_key("Backspace").await
        } else {
            self.type_text(value).await
        }
    }

    /// Calculate center point of a quad.
    pub(super) fn quad_center(quad: &[f64]) -> (f64, f64) {
        if quad.len() >= 8 {
            let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
            let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
            (x, y)
        } else {
            (0.0, 0.0)
        }
    }

    /// Axis-aligned bounds `(x, y, width, height)` of a quad.
    pub(crate) fn quad_bounds(quad: &[f64]) -> Option<(f64, f64, f64, f64)> {
        if quad.len() < 8 {
            return None;
        }
        let xs = [quad[0], quad[2], quad[4], quad[6]];
        let ys = [quad[1], quad[3], quad[5], quad[7]];
        let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min_x, min_y, max_x - min_x, max_y - min_y))
    }
}
