//! WAYPOINT Core - Shared Domain Model and Protocol Spine
//!
//! This crate holds everything both Waypoint services agree on:
//! - Type-safe entity identifiers (tenants, documents, tasks)
//! - The JSON-RPC 2.0 envelope codec and its error-code taxonomy
//! - The document/search domain model used by the retrieval service
//! - The task state machine, event, and agent-card model used by the
//!   task service
//!
//! The crate is deliberately free of HTTP and database dependencies so
//! that the protocol and state-machine rules can be tested in isolation.

pub mod document;
pub mod error;
pub mod identity;
pub mod rpc;
pub mod task;

// Re-export commonly used types
pub use document::{
    clamp_limit, normalize_weights, Document, HybridSearchParams, HybridSearchResult,
    SearchResult, DEFAULT_HYBRID_LIMIT, DEFAULT_LIST_LIMIT, MAX_HYBRID_LIMIT, MAX_LIST_LIMIT,
    RRF_K,
};
pub use error::CoreError;
pub use identity::{DocumentId, IdParseError, TaskId, TenantId};
pub use rpc::{codes, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use task::{
    AgentCard, Capability, Task, TaskEvent, TaskState, TransitionError,
};

/// Timestamp type used across both services (UTC everywhere).
pub type Timestamp = chrono::DateTime<chrono::Utc>;
