//! Hybrid search tool
//!
//! Combines lexical and vector retrieval through one of two fusion
//! strategies selectable by the caller:
//! - `weighted` (default): normalized linear combination of the
//!   text-search rank and the vector similarity;
//! - `rrf`: reciprocal-rank fusion of the two rankings with k = 60.

use super::{decode_args, ToolHandler};
use crate::auth::Principal;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::mcp::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use waypoint_core::{
    HybridSearchParams, HybridSearchResult, DEFAULT_HYBRID_LIMIT, MAX_HYBRID_LIMIT,
};

/// Hybrid lexical + semantic retrieval.
pub struct HybridSearchTool {
    db: DbClient,
}

impl HybridSearchTool {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HybridParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    bm25_weight: f64,
    #[serde(default)]
    vector_weight: f64,
    /// "weighted" (default) or "rrf".
    #[serde(default)]
    fusion: String,
}

/// One scored record in the result payload.
#[derive(Debug, Serialize)]
struct HybridRecord {
    doc_id: String,
    tenant_id: String,
    title: String,
    content: String,
    score: f64,
    bm25_score: f64,
    vector_score: f64,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    metadata: JsonValue,
    created_at: String,
}

impl From<HybridSearchResult> for HybridRecord {
    fn from(result: HybridSearchResult) -> Self {
        let doc = result.document;
        Self {
            doc_id: doc.id.to_string(),
            tenant_id: doc.tenant_id.to_string(),
            title: doc.title,
            content: doc.content,
            score: result.combined_score,
            bm25_score: result.lexical_score,
            vector_score: result.vector_score,
            metadata: doc.metadata,
            created_at: doc.created_at.to_rfc3339(),
        }
    }
}

#[async_trait]
impl ToolHandler for HybridSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "hybrid_search".to_string(),
            description:
                "Perform hybrid search combining BM25-style lexical search with vector semantic \
                 similarity. Returns the most relevant documents using both keyword matching and \
                 semantic understanding."
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query text"
                    },
                    "embedding": {
                        "type": "array",
                        "description": "Query embedding vector; omit to rank on the lexical signal only",
                        "items": { "type": "number" }
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return (default: 10, max: 50)",
                        "default": DEFAULT_HYBRID_LIMIT
                    },
                    "bm25_weight": {
                        "type": "number",
                        "description": "Weight for the lexical signal (default: 0.5)",
                        "default": 0.5
                    },
                    "vector_weight": {
                        "type": "number",
                        "description": "Weight for the semantic signal (default: 0.5)",
                        "default": 0.5
                    },
                    "fusion": {
                        "type": "string",
                        "enum": ["weighted", "rrf"],
                        "description": "Fusion strategy (default: weighted)",
                        "default": "weighted"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: JsonValue, principal: &Principal) -> ApiResult<ToolCallResult> {
        let params: HybridParams = decode_args(args)?;
        if params.query.trim().is_empty() {
            return Err(ApiError::missing_field("query"));
        }

        let mut db_params = HybridSearchParams::new(params.query);
        db_params.embedding = params.embedding;
        db_params.limit = params.limit;
        db_params.lexical_weight = params.bm25_weight;
        db_params.vector_weight = params.vector_weight;

        // Limits clamp to [1, 50] with 10 as the default; weights are
        // normalized inside the params type.
        debug_assert!(db_params.effective_limit() <= MAX_HYBRID_LIMIT);

        let results = match params.fusion.as_str() {
            "" | "weighted" => {
                self.db
                    .hybrid_search_weighted(principal.tenant_id, &db_params)
                    .await?
            }
            "rrf" => {
                self.db
                    .hybrid_search_rrf(principal.tenant_id, &db_params)
                    .await?
            }
            other => {
                return Err(ApiError::invalid_input(format!(
                    "Unknown fusion strategy '{}', expected 'weighted' or 'rrf'",
                    other
                )))
            }
        };

        let records: Vec<HybridRecord> = results.into_iter().map(HybridRecord::from).collect();
        let text = serde_json::to_string_pretty(&records)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode results: {}", e)))?;

        Ok(ToolCallResult::text(text))
    }
}
