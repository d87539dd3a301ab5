//! JSON-RPC 2.0 Envelope Codec
//!
//! Implements the JSON-RPC 2.0 wire format used by the retrieval service:
//! <https://www.jsonrpc.org/specification>
//!
//! `params` is kept as an unparsed [`RawValue`] and decoded lazily by the
//! method handler. Decoding where the method-specific schema is known keeps
//! type errors attributable to the right method instead of the transport.

use crate::error::CoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value as JsonValue;

/// The only protocol version this codec accepts.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 error codes.
///
/// The first block is the standard protocol set; the second block is the
/// application extension used by the retrieval service. Protocol errors are
/// surfaced with HTTP 200 (the transport succeeded, the RPC did not);
/// application errors map to semantic HTTP statuses.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Generic server error.
    pub const SERVER_ERROR: i64 = -32000;

    /// Authentication is required.
    pub const AUTHENTICATION_REQUIRED: i64 = -32001;
    /// Insufficient permissions.
    pub const AUTHORIZATION_FAILED: i64 = -32002;
    /// Rate limit exceeded.
    pub const RATE_LIMIT_EXCEEDED: i64 = -32003;
    /// Requested resource not found.
    pub const RESOURCE_NOT_FOUND: i64 = -32004;
    /// Input validation failed.
    pub const VALIDATION_ERROR: i64 = -32005;

    /// Standard English message for a given code.
    pub fn default_message(code: i64) -> &'static str {
        match code {
            PARSE_ERROR => "Parse error",
            INVALID_REQUEST => "Invalid Request",
            METHOD_NOT_FOUND => "Method not found",
            INVALID_PARAMS => "Invalid params",
            INTERNAL_ERROR => "Internal error",
            SERVER_ERROR => "Server error",
            AUTHENTICATION_REQUIRED => "Authentication required",
            AUTHORIZATION_FAILED => "Authorization failed",
            RATE_LIMIT_EXCEEDED => "Rate limit exceeded",
            RESOURCE_NOT_FOUND => "Resource not found",
            VALIDATION_ERROR => "Validation error",
            _ => "Unknown error",
        }
    }
}

/// A JSON-RPC 2.0 request envelope.
///
/// `id` may be a string, a number, or absent (a notification). `params`
/// stays unparsed until the handler knows which method it serves.
#[derive(Debug, Deserialize, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl RpcRequest {
    /// Build a request with already-typed params (used by tests and clients).
    pub fn new<P: Serialize>(
        id: Option<JsonValue>,
        method: impl Into<String>,
        params: Option<P>,
    ) -> Result<Self, serde_json::Error> {
        let params = match params {
            Some(p) => Some(RawValue::from_string(serde_json::to_string(&p)?)?),
            None => None,
        };
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        })
    }

    /// A request without an id is a notification.
    pub fn is_notification(&self) -> bool {
        matches!(self.id, None | Some(JsonValue::Null))
    }

    /// Check the envelope against the JSON-RPC 2.0 grammar.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(CoreError::protocol(format!(
                "invalid jsonrpc version: expected {}, got {}",
                JSONRPC_VERSION, self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(CoreError::protocol("method is required"));
        }
        Ok(())
    }

    /// Decode `params` into the method's parameter type.
    ///
    /// Absent params yield `T::default()`, mirroring the zero-value
    /// semantics callers rely on for all-optional parameter sets.
    pub fn parse_params<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned + Default,
    {
        match &self.params {
            Some(raw) => serde_json::from_str(raw.get()),
            None => Ok(T::default()),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error carrying the standard message for its code.
    pub fn from_code(code: i64) -> Self {
        Self::new(code, codes::default_message(code))
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 response envelope: either `result` or `error` is set.
#[derive(Debug, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Success response wrapping an already-serializable result.
    pub fn success<R: Serialize>(
        id: Option<JsonValue>,
        result: &R,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    /// Error response.
    pub fn failure(id: Option<JsonValue>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
