//! Property-Based Tests for the JSON-RPC Codec
//!
//! Serialize-then-parse of any well-formed request or response yields an
//! equal value (modulo JSON number width), and validation accepts exactly
//! the envelopes the JSON-RPC 2.0 grammar admits.

use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};
use waypoint_core::{clamp_limit, normalize_weights, RpcError, RpcRequest, RpcResponse};

// ============================================================================
// STRATEGIES
// ============================================================================

/// Request ids: string, number, or absent.
fn id_strategy() -> impl Strategy<Value = Option<JsonValue>> {
    prop_oneof![
        Just(None),
        any::<i64>().prop_map(|n| Some(json!(n))),
        "[a-zA-Z0-9-]{1,24}".prop_map(|s| Some(json!(s))),
    ]
}

fn method_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_/]{0,30}".prop_map(|s| s.to_string())
}

/// Flat JSON objects to use as params.
fn params_strategy() -> impl Strategy<Value = Option<JsonValue>> {
    let value = prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(|s| json!(s)),
    ];
    prop_oneof![
        Just(None),
        proptest::collection::hash_map("[a-z_]{1,8}", value, 0..5)
            .prop_map(|m| Some(json!(m))),
    ]
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn request_round_trip_preserves_envelope(
        id in id_strategy(),
        method in method_strategy(),
        params in params_strategy(),
    ) {
        let request = RpcRequest::new(id.clone(), method.clone(), params.clone())
            .expect("build request");

        let wire = serde_json::to_string(&request).expect("serialize");
        let back: RpcRequest = serde_json::from_str(&wire).expect("parse");

        prop_assert_eq!(back.jsonrpc.as_str(), "2.0");
        prop_assert_eq!(back.id, id);
        prop_assert_eq!(back.method, method);

        let decoded: Option<JsonValue> = back
            .params
            .as_ref()
            .map(|raw| serde_json::from_str(raw.get()).expect("params decode"));
        prop_assert_eq!(decoded, params);
    }

    #[test]
    fn well_formed_requests_validate(
        id in id_strategy(),
        method in method_strategy(),
    ) {
        let request = RpcRequest::new::<JsonValue>(id, method, None).expect("build");
        prop_assert!(request.validate().is_ok());
    }

    #[test]
    fn wrong_version_never_validates(
        version in "[0-9]\\.[0-9]",
        method in method_strategy(),
    ) {
        prop_assume!(version != "2.0");
        let raw = json!({"jsonrpc": version, "id": 1, "method": method}).to_string();
        let request: RpcRequest = serde_json::from_str(&raw).expect("parse");
        prop_assert!(request.validate().is_err());
    }

    #[test]
    fn error_response_round_trip(
        id in id_strategy(),
        code in -33000i64..-31000,
        message in "[a-zA-Z0-9 ]{1,40}",
    ) {
        let response = RpcResponse::failure(id.clone(), RpcError::new(code, message.clone()));
        let wire = serde_json::to_string(&response).expect("serialize");
        let back: RpcResponse = serde_json::from_str(&wire).expect("parse");

        prop_assert!(!back.is_success());
        prop_assert_eq!(back.id, id);
        let error = back.error.expect("error object");
        prop_assert_eq!(error.code, code);
        prop_assert_eq!(error.message, message);
    }

    #[test]
    fn clamped_limits_stay_in_range(requested in any::<i64>()) {
        let limit = clamp_limit(requested, 20, 100);
        prop_assert!(limit >= 1);
        prop_assert!(limit <= 100);
        if requested >= 1 && requested <= 100 {
            prop_assert_eq!(limit, requested);
        }
    }

    #[test]
    fn normalized_weights_sum_to_one(
        lexical in 0.0f64..1000.0,
        vector in 0.0f64..1000.0,
    ) {
        let (l, v) = normalize_weights(lexical, vector);
        prop_assert!((l + v - 1.0).abs() < 1e-9);
        prop_assert!(l >= 0.0 && v >= 0.0);
    }
}
