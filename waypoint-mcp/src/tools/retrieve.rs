//! Document retrieval tool

use super::{decode_args, ToolHandler};
use crate::auth::Principal;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::mcp::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use waypoint_core::DocumentId;

/// Fetch a single document by id.
pub struct RetrieveDocumentTool {
    db: DbClient,
}

impl RetrieveDocumentTool {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RetrieveParams {
    #[serde(default)]
    document_id: String,
}

#[async_trait]
impl ToolHandler for RetrieveDocumentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "retrieve_document".to_string(),
            description:
                "Retrieve a specific document by its ID. Returns the full document content and metadata."
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "The unique identifier of the document to retrieve"
                    }
                },
                "required": ["document_id"]
            }),
        }
    }

    async fn execute(&self, args: JsonValue, principal: &Principal) -> ApiResult<ToolCallResult> {
        let params: RetrieveParams = decode_args(args)?;
        if params.document_id.is_empty() {
            return Err(ApiError::missing_field("document_id"));
        }
        let id: DocumentId = params
            .document_id
            .parse()
            .map_err(|_| ApiError::invalid_input("document_id must be a UUID"))?;

        let document = self.db.get_document(principal.tenant_id, id).await?;

        let text = serde_json::to_string_pretty(&document)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode document: {}", e)))?;

        Ok(ToolCallResult::text(text))
    }
}
