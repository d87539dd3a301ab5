//! Lexical document search tool

use super::{decode_args, ToolHandler};
use crate::auth::Principal;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::mcp::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use waypoint_core::clamp_limit;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

/// Substring search across title, content, and metadata.
pub struct SearchDocumentsTool {
    db: DbClient,
}

impl SearchDocumentsTool {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: i64,
}

#[async_trait]
impl ToolHandler for SearchDocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_documents".to_string(),
            description:
                "Search documents by text query. Searches across title, content, and metadata fields."
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query text"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return (default: 10, max: 100)",
                        "default": DEFAULT_LIMIT
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: JsonValue, principal: &Principal) -> ApiResult<ToolCallResult> {
        let params: SearchParams = decode_args(args)?;
        if params.query.trim().is_empty() {
            return Err(ApiError::missing_field("query"));
        }
        let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);

        let documents = self
            .db
            .search_documents(principal.tenant_id, &params.query, limit)
            .await?;

        let text = serde_json::to_string_pretty(&documents)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode results: {}", e)))?;

        Ok(ToolCallResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConfig;
    use uuid::Uuid;
    use waypoint_core::TenantId;

    fn tool() -> SearchDocumentsTool {
        SearchDocumentsTool::new(DbClient::from_config(&DbConfig::default()).expect("lazy pool"))
    }

    fn principal() -> Principal {
        Principal {
            tenant_id: TenantId::new(Uuid::nil()),
            user_id: "tester".to_string(),
            scopes: vec![],
        }
    }

    #[test]
    fn definition_declares_required_query() {
        let def = tool().definition();
        assert_eq!(def.name, "search_documents");
        assert_eq!(def.input_schema["required"][0], "query");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let err = tool()
            .execute(json!({"query": "  "}), &principal())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingField);
    }

    #[tokio::test]
    async fn missing_arguments_are_rejected() {
        let err = tool()
            .execute(JsonValue::Null, &principal())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingField);
    }
}
