//! Tenant-Scoped Storage Façade
//!
//! PostgreSQL access through a deadpool connection pool. Every document
//! operation runs inside a transaction that first sets the session-local
//! `app.current_tenant_id` variable; the database's row-level security
//! policies evaluate against it, so tenant isolation holds even if a query
//! here forgets a predicate. The application account must not hold a role
//! that bypasses those policies.
//!
//! Retrieval operations implemented here: get by id, paginated list,
//! lexical search, vector similarity search, and the two hybrid fusion
//! variants (reciprocal-rank and weighted-score).

use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pgvector::Vector;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;
use waypoint_core::{
    Document, DocumentId, HybridSearchParams, HybridSearchResult, SearchResult, TenantId,
};
use waypoint_telemetry::METRICS;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "waypoint".to_string(),
            user: "waypoint".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Load database configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `WAYPOINT_DB_HOST` (default: localhost)
    /// - `WAYPOINT_DB_PORT` (default: 5432)
    /// - `WAYPOINT_DB_NAME` (default: waypoint)
    /// - `WAYPOINT_DB_USER` (default: waypoint)
    /// - `WAYPOINT_DB_PASSWORD` (default: empty)
    /// - `WAYPOINT_DB_POOL_SIZE` (default: 16)
    /// - `WAYPOINT_DB_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("WAYPOINT_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("WAYPOINT_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("WAYPOINT_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("WAYPOINT_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("WAYPOINT_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("WAYPOINT_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: Duration::from_secs(
                std::env::var("WAYPOINT_DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// NEW DOCUMENT INPUT
// ============================================================================

/// Fields of a document to insert; id and timestamps are database-assigned.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub metadata: JsonValue,
    pub embedding: Option<Vec<f32>>,
    pub created_by: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

/// Tenant-scoped database client.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Acquire a connection, retrying once on a backend failure.
    ///
    /// This is the single bounded-retry point of the storage layer; query
    /// failures are not retried.
    async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(deadpool_postgres::PoolError::Backend(first)) => {
                tracing::warn!(error = %first, "Connection acquisition failed, retrying once");
                self.pool.get().await.map_err(ApiError::from)
            }
            Err(e) => Err(ApiError::from(e)),
        }
    }

    /// Verify connectivity (used by readiness probes and startup).
    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Set the row-level-security tenant variable on a transaction.
    ///
    /// `SET LOCAL` takes no bind parameters; `tenant_id` is a typed UUID,
    /// so the interpolation cannot carry anything but hex digits and dashes.
    async fn set_tenant<'a>(
        tx: &tokio_postgres::Transaction<'a>,
        tenant_id: TenantId,
    ) -> ApiResult<()> {
        let stmt = format!(
            "SET LOCAL app.current_tenant_id = '{}'",
            tenant_id.as_uuid()
        );
        tx.batch_execute(&stmt).await.map_err(|e| {
            // A failure to establish tenant scope is a correctness failure:
            // fail closed, never run the query without it.
            tracing::error!(error = %e, tenant_id = %tenant_id, "Failed to set tenant context");
            ApiError::database_error("Failed to establish tenant scope")
        })
    }

    fn record_op(operation: &str, success: bool, started: Instant) {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_db_operation(operation, success, started.elapsed().as_secs_f64());
        }
    }

    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    /// Insert a document owned by the given tenant.
    pub async fn insert_document(
        &self,
        tenant_id: TenantId,
        doc: &NewDocument,
    ) -> ApiResult<Document> {
        let started = Instant::now();
        let result = self.insert_document_inner(tenant_id, doc).await;
        Self::record_op("insert_document", result.is_ok(), started);
        result
    }

    async fn insert_document_inner(
        &self,
        tenant_id: TenantId,
        doc: &NewDocument,
    ) -> ApiResult<Document> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let embedding = doc.embedding.clone().map(Vector::from);
        let row = tx
            .query_one(
                "INSERT INTO documents (tenant_id, title, content, metadata, embedding, created_by)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, created_at, updated_at",
                &[
                    &tenant_id.as_uuid(),
                    &doc.title,
                    &doc.content,
                    &doc.metadata,
                    &embedding,
                    &doc.created_by,
                ],
            )
            .await?;
        tx.commit().await?;

        Ok(Document {
            id: DocumentId::new(row.get(0)),
            tenant_id,
            title: doc.title.clone(),
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
            embedding: doc.embedding.clone(),
            created_at: row.get(1),
            updated_at: row.get(2),
            created_by: doc.created_by.clone(),
        })
    }

    /// Fetch a single document by id.
    ///
    /// Rows owned by other tenants are invisible under the session's RLS
    /// scope, so cross-tenant probes surface as not-found.
    pub async fn get_document(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> ApiResult<Document> {
        let started = Instant::now();
        let result = self.get_document_inner(tenant_id, id).await;
        Self::record_op("get_document", result.is_ok(), started);
        result
    }

    async fn get_document_inner(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> ApiResult<Document> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let row = tx
            .query_opt(
                "SELECT id, tenant_id, title, content, metadata, embedding,
                        created_at, updated_at, created_by
                 FROM documents
                 WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await?;

        row.map(|r| document_from_row(&r, true))
            .transpose()?
            .ok_or_else(|| ApiError::entity_not_found("Document", id))
    }

    /// List the tenant's documents, newest first.
    pub async fn list_documents(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Vec<Document>> {
        let started = Instant::now();
        let result = self.list_documents_inner(tenant_id, limit, offset).await;
        Self::record_op("list_documents", result.is_ok(), started);
        result
    }

    async fn list_documents_inner(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Vec<Document>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let rows = tx
            .query(
                "SELECT id, tenant_id, title, content, metadata,
                        created_at, updated_at, created_by
                 FROM documents
                 ORDER BY created_at DESC
                 LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await?;

        rows.iter().map(|r| document_from_row(r, false)).collect()
    }

    /// Substring search over title, content, and stringified metadata.
    pub async fn search_documents(
        &self,
        tenant_id: TenantId,
        query: &str,
        limit: i64,
    ) -> ApiResult<Vec<Document>> {
        let started = Instant::now();
        let result = self.search_documents_inner(tenant_id, query, limit).await;
        Self::record_op("search_documents", result.is_ok(), started);
        result
    }

    async fn search_documents_inner(
        &self,
        tenant_id: TenantId,
        query: &str,
        limit: i64,
    ) -> ApiResult<Vec<Document>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let pattern = format!("%{}%", query);
        let rows = tx
            .query(
                "SELECT id, tenant_id, title, content, metadata,
                        created_at, updated_at, created_by
                 FROM documents
                 WHERE title ILIKE $1 OR content ILIKE $1 OR metadata::text ILIKE $1
                 ORDER BY created_at DESC
                 LIMIT $2",
                &[&pattern, &limit],
            )
            .await?;

        rows.iter().map(|r| document_from_row(r, false)).collect()
    }

    /// Cosine-similarity search. Rows without an embedding are skipped;
    /// the score is `1 - distance`.
    pub async fn vector_search(
        &self,
        tenant_id: TenantId,
        embedding: &[f32],
        limit: i64,
    ) -> ApiResult<Vec<SearchResult>> {
        let started = Instant::now();
        let result = self.vector_search_inner(tenant_id, embedding, limit).await;
        Self::record_op("vector_search", result.is_ok(), started);
        result
    }

    async fn vector_search_inner(
        &self,
        tenant_id: TenantId,
        embedding: &[f32],
        limit: i64,
    ) -> ApiResult<Vec<SearchResult>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let query_vec = Vector::from(embedding.to_vec());
        let rows = tx
            .query(
                "SELECT id, tenant_id, title, content, metadata, embedding,
                        created_at, updated_at, created_by,
                        (1 - (embedding <=> $1))::float8 AS similarity_score
                 FROM documents
                 WHERE embedding IS NOT NULL
                 ORDER BY embedding <=> $1
                 LIMIT $2",
                &[&query_vec, &limit],
            )
            .await?;

        rows.iter()
            .map(|r| {
                Ok(SearchResult {
                    document: document_from_row(r, true)?,
                    score: r.get("similarity_score"),
                })
            })
            .collect()
    }

    /// Reciprocal-rank fusion of lexical and vector rankings.
    ///
    /// Each sub-query fetches twice the requested limit before fusion so a
    /// document that ranks poorly on one signal but well on the other is
    /// not lost. Missing ranks contribute zero.
    pub async fn hybrid_search_rrf(
        &self,
        tenant_id: TenantId,
        params: &HybridSearchParams,
    ) -> ApiResult<Vec<HybridSearchResult>> {
        let started = Instant::now();
        let result = self.hybrid_search_rrf_inner(tenant_id, params).await;
        Self::record_op("hybrid_search_rrf", result.is_ok(), started);
        result
    }

    async fn hybrid_search_rrf_inner(
        &self,
        tenant_id: TenantId,
        params: &HybridSearchParams,
    ) -> ApiResult<Vec<HybridSearchResult>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let (lexical_weight, vector_weight) = params.normalized_weights();
        let limit = params.effective_limit();
        let oversample = params.oversample_limit();
        let embedding = params.embedding.clone().map(Vector::from);

        let rows = tx
            .query(
                "WITH lexical_results AS (
                     SELECT id, tenant_id, title, content, metadata, embedding,
                            created_at, updated_at, created_by,
                            ts_rank_cd(
                                to_tsvector('english', title || ' ' || content),
                                plainto_tsquery('english', $1)
                            )::float8 AS lexical_score,
                            ROW_NUMBER() OVER (ORDER BY ts_rank_cd(
                                to_tsvector('english', title || ' ' || content),
                                plainto_tsquery('english', $1)
                            ) DESC) AS lexical_rank
                     FROM documents
                     WHERE to_tsvector('english', title || ' ' || content)
                           @@ plainto_tsquery('english', $1)
                     ORDER BY lexical_score DESC
                     LIMIT $8
                 ),
                 vector_results AS (
                     SELECT id, tenant_id, title, content, metadata, embedding,
                            created_at, updated_at, created_by,
                            (1 - (embedding <=> $2))::float8 AS vector_score,
                            ROW_NUMBER() OVER (ORDER BY embedding <=> $2) AS vector_rank
                     FROM documents
                     WHERE embedding IS NOT NULL AND $2::vector IS NOT NULL
                     ORDER BY embedding <=> $2
                     LIMIT $8
                 ),
                 combined AS (
                     SELECT
                         COALESCE(l.id, v.id) AS id,
                         COALESCE(l.tenant_id, v.tenant_id) AS tenant_id,
                         COALESCE(l.title, v.title) AS title,
                         COALESCE(l.content, v.content) AS content,
                         COALESCE(l.metadata, v.metadata) AS metadata,
                         COALESCE(l.embedding, v.embedding) AS embedding,
                         COALESCE(l.created_at, v.created_at) AS created_at,
                         COALESCE(l.updated_at, v.updated_at) AS updated_at,
                         COALESCE(l.created_by, v.created_by) AS created_by,
                         COALESCE(l.lexical_score, 0)::float8 AS lexical_score,
                         COALESCE(v.vector_score, 0)::float8 AS vector_score,
                         (
                             COALESCE(1.0 / (60 + l.lexical_rank), 0)::float8 * $3::float8 +
                             COALESCE(1.0 / (60 + v.vector_rank), 0)::float8 * $4::float8
                         )::float8 AS combined_score
                     FROM lexical_results l
                     FULL OUTER JOIN vector_results v ON l.id = v.id
                     WHERE COALESCE(l.lexical_score, 0) >= $5
                        OR COALESCE(v.vector_score, 0) >= $6
                 )
                 SELECT id, tenant_id, title, content, metadata, embedding,
                        created_at, updated_at, created_by,
                        lexical_score, vector_score, combined_score
                 FROM combined
                 ORDER BY combined_score DESC
                 LIMIT $7",
                &[
                    &params.query,
                    &embedding,
                    &lexical_weight,
                    &vector_weight,
                    &params.min_lexical_score,
                    &params.min_vector_similarity,
                    &limit,
                    &oversample,
                ],
            )
            .await?;

        rows.iter().map(|r| hybrid_result_from_row(r)).collect()
    }

    /// Weighted-score fusion: the normalized linear combination of the
    /// text-search rank and vector similarity. Documents without an
    /// embedding keep their lexical eligibility with a zero vector term.
    pub async fn hybrid_search_weighted(
        &self,
        tenant_id: TenantId,
        params: &HybridSearchParams,
    ) -> ApiResult<Vec<HybridSearchResult>> {
        let started = Instant::now();
        let result = self.hybrid_search_weighted_inner(tenant_id, params).await;
        Self::record_op("hybrid_search_weighted", result.is_ok(), started);
        result
    }

    async fn hybrid_search_weighted_inner(
        &self,
        tenant_id: TenantId,
        params: &HybridSearchParams,
    ) -> ApiResult<Vec<HybridSearchResult>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        Self::set_tenant(&tx, tenant_id).await?;

        let (lexical_weight, vector_weight) = params.normalized_weights();
        let limit = params.effective_limit();
        let embedding = params.embedding.clone().map(Vector::from);

        let rows = tx
            .query(
                "SELECT id, tenant_id, title, content, metadata, embedding,
                        created_at, updated_at, created_by,
                        ts_rank_cd(
                            to_tsvector('english', title || ' ' || content),
                            plainto_tsquery('english', $1)
                        )::float8 AS lexical_score,
                        (CASE
                             WHEN embedding IS NOT NULL AND $2::vector IS NOT NULL
                             THEN 1 - (embedding <=> $2)
                             ELSE 0
                         END)::float8 AS vector_score,
                        (
                            ts_rank_cd(
                                to_tsvector('english', title || ' ' || content),
                                plainto_tsquery('english', $1)
                            )::float8 * $3::float8 +
                            (CASE
                                 WHEN embedding IS NOT NULL AND $2::vector IS NOT NULL
                                 THEN 1 - (embedding <=> $2)
                                 ELSE 0
                             END)::float8 * $4::float8
                        )::float8 AS combined_score
                 FROM documents
                 WHERE to_tsvector('english', title || ' ' || content)
                       @@ plainto_tsquery('english', $1)
                    OR (embedding IS NOT NULL AND $2::vector IS NOT NULL
                        AND (1 - (embedding <=> $2)) >= $6)
                 ORDER BY combined_score DESC
                 LIMIT $5",
                &[
                    &params.query,
                    &embedding,
                    &lexical_weight,
                    &vector_weight,
                    &limit,
                    &params.min_vector_similarity,
                ],
            )
            .await?;

        rows.iter().map(|r| hybrid_result_from_row(r)).collect()
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Convert a row into a [`Document`]. `with_embedding` reflects whether the
/// query selected the embedding column.
fn document_from_row(row: &Row, with_embedding: bool) -> ApiResult<Document> {
    let embedding: Option<Vec<f32>> = if with_embedding {
        row.try_get::<_, Option<Vector>>("embedding")
            .map_err(ApiError::from)?
            .map(|v| v.to_vec())
    } else {
        None
    };

    Ok(Document {
        id: DocumentId::new(row.try_get("id").map_err(ApiError::from)?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id").map_err(ApiError::from)?),
        title: row.try_get("title").map_err(ApiError::from)?,
        content: row.try_get("content").map_err(ApiError::from)?,
        metadata: row
            .try_get::<_, Option<JsonValue>>("metadata")
            .map_err(ApiError::from)?
            .unwrap_or(JsonValue::Null),
        embedding,
        created_at: row.try_get("created_at").map_err(ApiError::from)?,
        updated_at: row.try_get("updated_at").map_err(ApiError::from)?,
        created_by: row.try_get("created_by").map_err(ApiError::from)?,
    })
}

fn hybrid_result_from_row(row: &Row) -> ApiResult<HybridSearchResult> {
    Ok(HybridSearchResult {
        document: document_from_row(row, true)?,
        lexical_score: row.try_get("lexical_score").map_err(ApiError::from)?,
        vector_score: row.try_get("vector_score").map_err(ApiError::from)?,
        combined_score: row.try_get("combined_score").map_err(ApiError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.dbname, "waypoint");
    }

    #[test]
    fn pool_creation_is_lazy() {
        // No database is listening in unit tests; pool construction must
        // still succeed because connections are opened on first use.
        let client = DbClient::from_config(&DbConfig::default()).expect("pool builds");
        assert_eq!(client.pool_size(), 0);
    }

    #[test]
    fn tenant_variable_statement_shape() {
        // The SET LOCAL statement interpolates a typed UUID only.
        let tenant = TenantId::nil();
        let stmt = format!("SET LOCAL app.current_tenant_id = '{}'", tenant.as_uuid());
        assert_eq!(
            stmt,
            "SET LOCAL app.current_tenant_id = '00000000-0000-0000-0000-000000000000'"
        );
    }
}
