//! Document domain model and retrieval parameter rules
//!
//! A document belongs to exactly one tenant for its entire lifetime; every
//! query against the corpus is filtered by the caller's tenant. The types
//! here also centralize the parameter rules the retrieval operations share:
//! limit clamping and fusion-weight normalization.

use crate::identity::{DocumentId, TenantId};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default page size for list-style operations.
pub const DEFAULT_LIST_LIMIT: i64 = 20;
/// Hard ceiling for list-style operations.
pub const MAX_LIST_LIMIT: i64 = 100;
/// Default result count for hybrid search.
pub const DEFAULT_HYBRID_LIMIT: i64 = 10;
/// Hard ceiling for hybrid search.
pub const MAX_HYBRID_LIMIT: i64 = 50;

/// The standard reciprocal-rank-fusion constant.
pub const RRF_K: f64 = 60.0;

/// A tenant-owned document with optional embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub title: String,
    pub content: String,
    /// Free-form key/value metadata.
    pub metadata: JsonValue,
    /// Fixed-dimension embedding; absence is permitted and excludes the
    /// document from pure vector retrieval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// A document paired with a single relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    pub score: f64,
}

/// A document scored by both retrieval signals and their fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSearchResult {
    pub document: Document,
    pub lexical_score: f64,
    pub vector_score: f64,
    pub combined_score: f64,
}

/// Parameters for the hybrid retrieval operations.
///
/// Weights arrive raw from the caller; [`HybridSearchParams::normalized_weights`]
/// applies the normalization rule before any query runs.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchParams {
    pub query: String,
    pub embedding: Option<Vec<f32>>,
    pub limit: i64,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    pub min_lexical_score: f64,
    pub min_vector_similarity: f64,
}

impl HybridSearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            embedding: None,
            limit: DEFAULT_HYBRID_LIMIT,
            lexical_weight: 0.5,
            vector_weight: 0.5,
            min_lexical_score: 0.0,
            min_vector_similarity: 0.0,
        }
    }

    /// The effective `(lexical, vector)` weights after normalization.
    pub fn normalized_weights(&self) -> (f64, f64) {
        normalize_weights(self.lexical_weight, self.vector_weight)
    }

    /// The effective result limit after clamping.
    pub fn effective_limit(&self) -> i64 {
        clamp_limit(self.limit, DEFAULT_HYBRID_LIMIT, MAX_HYBRID_LIMIT)
    }

    /// How many candidates each sub-query fetches before fusion.
    ///
    /// Oversampling by 2x keeps a document that ranks poorly on one signal
    /// but well on the other inside the fusion window.
    pub fn oversample_limit(&self) -> i64 {
        self.effective_limit() * 2
    }
}

/// Clamp a caller-supplied limit: non-positive values take the default,
/// values above the ceiling are capped.
pub fn clamp_limit(requested: i64, default: i64, max: i64) -> i64 {
    if requested <= 0 {
        default
    } else if requested > max {
        max
    } else {
        requested
    }
}

/// Normalize fusion weights so they sum to one.
///
/// Both zero substitutes the even split `(0.5, 0.5)`.
pub fn normalize_weights(lexical: f64, vector: f64) -> (f64, f64) {
    let total = lexical + vector;
    if total == 0.0 {
        (0.5, 0.5)
    } else {
        (lexical / total, vector / total)
    }
}
