//! Document listing tool

use super::{decode_args, ToolHandler};
use crate::auth::Principal;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::mcp::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use waypoint_core::{clamp_limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Paginated listing of the tenant's documents, newest first.
pub struct ListDocumentsTool {
    db: DbClient,
}

impl ListDocumentsTool {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[async_trait]
impl ToolHandler for ListDocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_documents".to_string(),
            description: "List all documents for the current tenant with pagination support."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of documents to return (default: 20, max: 100)",
                        "default": DEFAULT_LIST_LIMIT
                    },
                    "offset": {
                        "type": "number",
                        "description": "Number of documents to skip (default: 0)",
                        "default": 0
                    }
                }
            }),
        }
    }

    async fn execute(&self, args: JsonValue, principal: &Principal) -> ApiResult<ToolCallResult> {
        let params: ListParams = decode_args(args)?;
        let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        let offset = params.offset.max(0);

        let documents = self
            .db
            .list_documents(principal.tenant_id, limit, offset)
            .await?;

        let text = serde_json::to_string_pretty(&documents)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode results: {}", e)))?;

        Ok(ToolCallResult::text(text))
    }
}
