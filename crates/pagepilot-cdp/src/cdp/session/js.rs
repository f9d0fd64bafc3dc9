//! Script evaluation in the page's main world.

use serde_json::{json, Value};

use crate::cdp::error::CdpError;

use super::core::PageSession;

impl PageSession {
    /// Evaluate an expression, awaiting a returned promise, and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let params = json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let reply = self.call("Runtime.evaluate", Some(params)).await?;
        Self::runtime_value(reply)
    }

    /// Run `function` with `this` bound to a remote object.
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function: &str,
        args: Option<Vec<Value>>,
    ) -> Result<Value, CdpError> {
        let arguments: Vec<Value> = args
            .unwrap_or_default()
            .into_iter()
            .map(|value| json!({ "value": value }))
            .collect();
        let params = json!({
            "objectId": object_id,
            "functionDeclaration": function,
            "arguments": arguments,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let reply = self.call("Runtime.callFunctionOn", Some(params)).await?;
        Self::runtime_value(reply)
    }

    /// Fetch `url` from inside the page and return the body as a `data:` URL.
    ///
    /// `blob:` URLs only resolve in the document that created them.
    pub async fn fetch_as_data_url(&self, url: &str) -> Result<String, CdpError> {
        match self.evaluate(&Self::fetch_expression(url)).await? {
            Value::String(data_url) => Ok(data_url),
            other => Err(CdpError::InvalidResponse(format!(
                "in-page fetch returned {}",
                other
            ))),
        }
    }

    pub(super) fn fetch_expression(url: &str) -> String {
        // A JSON string literal is also a JS string literal.
        let target = Value::String(url.to_string());
        format!(
            r#"(async () => {{
    const res = await fetch({target});
    if (!res.ok) throw new Error('HTTP ' + res.status);
    const blob = await res.blob();
    return await new Promise((resolve, reject) => {{
        const reader = new FileReader();
        reader.onloadend = () => resolve(reader.result);
        reader.onerror = () => reject(reader.error);
        reader.readAsDataURL(blob);
    }});
}})()"#
        )
    }

    /// Unwrap `result.value`, turning a thrown exception into an error.
    pub(super) fn runtime_value(mut reply: Value) -> Result<Value, CdpError> {
        if let Some(details) = reply.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("uncaught exception");
            return Err(CdpError::JavaScript(message.to_string()));
        }
        Ok(reply
            .pointer_mut("/result/value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}
