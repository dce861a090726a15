//! Tool Registry (C3).
//!
//! A process-wide table mapping tool name -> tool definition (schemas,
//! risk tag, handler), the same shape as the teacher's `Harness` trait
//! stored in `HarnessRegistry` (`harness/trait_def.rs`, `harness/registry.rs`):
//! an object-safe async trait boxed into a `HashMap`, built once at
//! startup and held immutable behind an `Arc` (no locking needed).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use fabric_db::models::ToolRisk;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool {0} not found in registry")]
    NotFound(String),
    #[error("argument object failed input schema validation for tool {tool}: {detail}")]
    InvalidInput { tool: String, detail: String },
    #[error("result failed output schema validation for tool {tool}: {detail}")]
    InvalidOutput { tool: String, detail: String },
    #[error("tool {tool} invocation failed: {source}")]
    HandlerFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Object-safe async trait for a tool's handler logic. Schemas and the
/// risk tag live on [`ToolDefinition`] rather than on the trait, since
/// they are static metadata known at registration time, not something an
/// individual handler needs to report about itself.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: Value) -> anyhow::Result<Value>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ToolHandler) {}
};

pub struct ToolDefinition {
    pub name: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub risk: ToolRisk,
    handler: Box<dyn ToolHandler>,
}

/// A named, typed capability registry. Tools are registered at startup;
/// dynamic registration is not required (SPEC_FULL §4.3).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        input_schema: Value,
        output_schema: Value,
        risk: ToolRisk,
        handler: impl ToolHandler + 'static,
    ) {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            ToolDefinition {
                name,
                input_schema,
                output_schema,
                risk,
                handler: Box::new(handler),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `true` if any registered tool in `names` carries `mutate_irreversible`
    /// risk -- a plan touching one forces `hitl_required = true`.
    pub fn any_irreversible(&self, names: &[String]) -> bool {
        names.iter().any(|n| {
            self.tools
                .get(n)
                .is_some_and(|def| def.risk == ToolRisk::MutateIrreversible)
        })
    }

    /// Validate the argument object against the tool's input schema, then
    /// dispatch, then validate the result against the output schema.
    /// Schema validation here is structural (object vs array vs scalar,
    /// required top-level keys) rather than a full JSON Schema dialect --
    /// an external validator is assumed for anything deeper (SPEC_FULL,
    /// Non-goals).
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let def = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        validate_shape(&args, &def.input_schema).map_err(|detail| ToolError::InvalidInput {
            tool: name.to_string(),
            detail,
        })?;

        let result = def
            .handler
            .invoke(args)
            .await
            .map_err(|source| ToolError::HandlerFailed {
                tool: name.to_string(),
                source,
            })?;

        validate_shape(&result, &def.output_schema).map_err(|detail| ToolError::InvalidOutput {
            tool: name.to_string(),
            detail,
        })?;

        Ok(result)
    }
}

/// Structural check: if the schema declares `"type": "object"`, the value
/// must be a JSON object and every name in `"required"` must be present.
/// Anything looser than that is left to the external validator.
fn validate_shape(value: &Value, schema: &Value) -> Result<(), String> {
    let Some(expected_type) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    let matches = match expected_type {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        _ => true,
    };
    if !matches {
        return Err(format!("expected JSON type {expected_type}, got {value}"));
    }

    if expected_type == "object" {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required {
                let Some(field_name) = field.as_str() else {
                    continue;
                };
                if value.get(field_name).is_none() {
                    return Err(format!("missing required field: {field_name}"));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn invoke(&self, args: Value) -> anyhow::Result<Value> {
            Ok(args)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn invoke(&self, _args: Value) -> anyhow::Result<Value> {
            anyhow::bail!("boom")
        }
    }

    fn object_schema(required: &[&str]) -> Value {
        json!({"type": "object", "required": required})
    }

    #[test]
    fn registry_starts_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "query_assets",
            object_schema(&["selector"]),
            object_schema(&[]),
            ToolRisk::Read,
            EchoTool,
        );
        let def = registry.get("query_assets").unwrap();
        assert_eq!(def.risk, ToolRisk::Read);
    }

    #[test]
    fn any_irreversible_detects_mutate_irreversible() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "apply_change",
            object_schema(&[]),
            object_schema(&[]),
            ToolRisk::MutateIrreversible,
            EchoTool,
        );
        registry.register(
            "query_assets",
            object_schema(&[]),
            object_schema(&[]),
            ToolRisk::Read,
            EchoTool,
        );
        assert!(registry.any_irreversible(&["apply_change".to_string()]));
        assert!(!registry.any_irreversible(&["query_assets".to_string()]));
    }

    #[tokio::test]
    async fn invoke_missing_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_rejects_missing_required_field() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "query_assets",
            object_schema(&["selector"]),
            object_schema(&[]),
            ToolRisk::Read,
            EchoTool,
        );
        let err = registry
            .invoke("query_assets", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn invoke_dispatches_and_returns_result() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "query_assets",
            object_schema(&["selector"]),
            object_schema(&[]),
            ToolRisk::Read,
            EchoTool,
        );
        let result = registry
            .invoke("query_assets", json!({"selector": "all"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"selector": "all"}));
    }

    #[tokio::test]
    async fn invoke_wraps_handler_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "apply_change",
            object_schema(&[]),
            object_schema(&[]),
            ToolRisk::MutateReversible,
            FailingTool,
        );
        let err = registry
            .invoke("apply_change", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::HandlerFailed { .. }));
    }
}
