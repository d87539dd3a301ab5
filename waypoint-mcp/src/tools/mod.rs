//! Tool Registry and Dispatch
//!
//! Tools are selected by explicit name lookup; `execute` is the only path
//! through which tool side effects occur. The registry is populated once
//! at startup and read-only afterwards.

pub mod hybrid;
pub mod list;
pub mod retrieve;
pub mod search;

pub use hybrid::HybridSearchTool;
pub use list::ListDocumentsTool;
pub use retrieve::RetrieveDocumentTool;
pub use search::SearchDocumentsTool;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::mcp::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_telemetry::METRICS;

/// A named, schema-declared operation the retrieval service exposes.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool's advertised definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Run the tool for an authenticated principal.
    async fn execute(&self, args: JsonValue, principal: &Principal) -> ApiResult<ToolCallResult>;
}

/// Name -> handler map.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names are unique for the process lifetime.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) -> ApiResult<()> {
        let name = tool.definition().name;
        if self.tools.contains_key(&name) {
            return Err(ApiError::internal_error(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// All registered tool definitions, sorted by name for stable output.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: JsonValue,
        principal: &Principal,
    ) -> ApiResult<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ApiError::entity_not_found("Tool", name))?;

        let result = tool.execute(args, principal).await;
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_tool_call(name, result.is_ok());
        }
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode tool arguments into a typed parameter struct.
///
/// Absent arguments (`null`) take the struct's defaults; a shape mismatch
/// is a validation failure attributed to the tool's schema.
pub(crate) fn decode_args<T>(args: JsonValue) -> ApiResult<T>
where
    T: DeserializeOwned + Default,
{
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args)
        .map_err(|e| ApiError::validation_failed(format!("Invalid arguments: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use uuid::Uuid;
    use waypoint_core::TenantId;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the arguments back".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            args: JsonValue,
            _principal: &Principal,
        ) -> ApiResult<ToolCallResult> {
            Ok(ToolCallResult::text(args.to_string()))
        }
    }

    fn principal() -> Principal {
        Principal {
            tenant_id: TenantId::new(Uuid::nil()),
            user_id: "tester".to_string(),
            scopes: vec!["read".to_string()],
        }
    }

    #[test]
    fn register_then_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).expect("register");
        assert_eq!(registry.len(), 1);

        let defs = registry.list();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[test]
    fn double_register_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).expect("first register");
        assert!(registry.register(Arc::new(EchoTool)).is_err());
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).expect("register");

        let result = registry
            .execute("echo", json!({"x": 1}), &principal())
            .await
            .expect("execute");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", JsonValue::Null, &principal())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::EntityNotFound);
    }

    #[test]
    fn decode_args_null_takes_defaults() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        struct P {
            #[serde(default)]
            limit: i64,
        }

        let p: P = decode_args(JsonValue::Null).expect("defaults");
        assert_eq!(p, P::default());

        let p: P = decode_args(json!({"limit": 7})).expect("decode");
        assert_eq!(p.limit, 7);

        let err = decode_args::<P>(json!({"limit": "seven"})).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ValidationFailed);
    }
}
