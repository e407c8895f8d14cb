//! Tool Registry capability interface (§9 "Tool Registry ... as capability
//! interfaces, each injected into the Coordination Server at
//! construction"). This is the seam `dispatch` (§4.2) calls through to
//! reach its documented `completed | failed` transition — unlike the rest
//! of the tool-execution machinery, whether a given call succeeds is a
//! real decision made here, not a foregone conclusion.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use buckley_core::BuckleyError;

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Invoke `tool` with `parameters`. An unknown tool name, or
    /// parameters a tool's handler rejects, surface as `Err` so the
    /// caller can emit a `failed` transition instead of a synthetic
    /// success.
    async fn invoke(&self, tool: &str, parameters: &JsonValue) -> Result<JsonValue, BuckleyError>;
}

type Handler = Box<dyn Fn(&JsonValue) -> Result<JsonValue, BuckleyError> + Send + Sync>;

/// In-process registry of named tool handlers. Handlers here are
/// deliberately simple — the point is that the registry can reject a
/// call, not that it shells out or touches the filesystem for real; a
/// production deployment would inject a registry backed by whatever
/// executes these tools.
pub struct BuiltinToolRegistry {
    handlers: HashMap<String, Handler>,
}

impl BuiltinToolRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Handler> = HashMap::new();

        handlers.insert(
            "shell".to_string(),
            Box::new(|parameters| {
                let command = parameters.get("command").and_then(JsonValue::as_str).unwrap_or("");
                if command.trim().is_empty() {
                    return Err(BuckleyError::invalid_argument("shell tool requires a non-empty command"));
                }
                Ok(serde_json::json!({ "command": command, "exit_code": 0 }))
            }),
        );
        handlers.insert(
            "write_file".to_string(),
            Box::new(|parameters| {
                let path = parameters.get("path").and_then(JsonValue::as_str).unwrap_or("");
                if path.is_empty() {
                    return Err(BuckleyError::invalid_argument("write_file tool requires a path"));
                }
                Ok(serde_json::json!({ "path": path, "written": true }))
            }),
        );
        handlers.insert(
            "read_file".to_string(),
            Box::new(|parameters| {
                let path = parameters.get("path").and_then(JsonValue::as_str).unwrap_or("");
                if path.is_empty() {
                    return Err(BuckleyError::invalid_argument("read_file tool requires a path"));
                }
                Ok(serde_json::json!({ "path": path }))
            }),
        );

        Self { handlers }
    }
}

impl Default for BuiltinToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for BuiltinToolRegistry {
    async fn invoke(&self, tool: &str, parameters: &JsonValue) -> Result<JsonValue, BuckleyError> {
        match self.handlers.get(tool) {
            Some(handler) => handler(parameters),
            None => Err(BuckleyError::not_found(format!("tool {tool}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_tool_fails() {
        let registry = BuiltinToolRegistry::new();
        let err = registry.invoke("does-not-exist", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn shell_without_command_fails() {
        let registry = BuiltinToolRegistry::new();
        let err = registry.invoke("shell", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn shell_with_command_succeeds() {
        let registry = BuiltinToolRegistry::new();
        let result = registry.invoke("shell", &json!({"command": "echo hi"})).await.unwrap();
        assert_eq!(result["command"], "echo hi");
    }
}
