//! Bearer Token Validation
//!
//! Verifies RS256-signed bearer tokens and extracts the request principal.
//! Signature verification is delegated to `jsonwebtoken`; temporal claims
//! (`exp`, `nbf`) are validated against an injected clock so tests are
//! deterministic and broken CI clocks cannot panic the process.
//!
//! Only the RSA family is accepted. A token signed with a symmetric
//! algorithm must fail even if its HMAC key happens to be the public key
//! bytes (key-confusion attack), which `Validation::new(Algorithm::RS256)`
//! enforces at the header level.

use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use waypoint_core::TenantId;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for token time validation.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// CLAIMS AND PRINCIPAL
// ============================================================================

/// The `aud` claim may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

/// Claims carried by a Waypoint bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant the caller belongs to. Required, must be a UUID.
    #[serde(default)]
    pub tenant_id: String,

    /// Caller identity within the tenant.
    #[serde(default)]
    pub user_id: String,

    /// Authorization scopes (e.g. "read", "write", "admin").
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Token issuer.
    #[serde(default)]
    pub iss: String,

    /// Token audience.
    pub aud: Option<Audience>,

    /// Expiration (Unix seconds). Required.
    pub exp: i64,

    /// Issued-at (Unix seconds).
    #[serde(default)]
    pub iat: i64,

    /// Not-before (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// The authenticated identity of a request, valid for one request.
///
/// Every downstream operation (tool execution, storage access, rate-limit
/// keying, log attribution) reads the principal from the request context;
/// no storage operation runs without one.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Token validator configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// RSA public key in PEM format.
    pub public_key_pem: String,
    /// Expected `iss` value.
    pub issuer: String,
    /// Expected `aud` value.
    pub audience: String,
    /// Clock-skew tolerance in seconds applied to `exp` and `nbf`.
    pub leeway_secs: i64,
    /// Clock used for temporal validation.
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("public_key_pem", &format!("[{} bytes]", self.public_key_pem.len()))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .field("clock", &"<Clock>")
            .finish()
    }
}

/// Verifies bearer tokens and produces [`Principal`]s.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    leeway_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    /// Build a validator from configuration.
    ///
    /// Fails fast on malformed key material so a misconfigured deployment
    /// dies at startup, not on the first request.
    pub fn new(config: AuthConfig) -> ApiResult<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key_pem.as_bytes())
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to parse RSA public key: {}", e))
            })?;

        Ok(Self {
            decoding_key,
            issuer: config.issuer,
            audience: config.audience,
            leeway_secs: config.leeway_secs,
            clock: config.clock,
        })
    }

    /// Validate a bearer token (with or without the `Bearer ` prefix) and
    /// return the principal it asserts.
    pub fn validate(&self, token: &str) -> ApiResult<Principal> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(ApiError::unauthorized("Empty bearer token"));
        }

        // Signature and algorithm-family checks only; temporal and
        // issuer/audience checks are done below with typed errors.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::invalid_token("Token signature is invalid")
                }
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => {
                    ApiError::invalid_token("Token signing algorithm is not permitted")
                }
                _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
            }
        })?;
        let claims = token_data.claims;

        let now = self.clock.now_epoch_secs();
        self.validate_times(now, claims.exp, claims.nbf)?;

        if claims.iss != self.issuer {
            return Err(ApiError::invalid_token(format!(
                "Invalid issuer: expected {}",
                self.issuer
            )));
        }

        match &claims.aud {
            Some(aud) if aud.contains(&self.audience) => {}
            _ => return Err(ApiError::invalid_token("Invalid audience")),
        }

        if claims.tenant_id.is_empty() {
            return Err(ApiError::invalid_token("tenant_id claim is required"));
        }
        let tenant_id: TenantId = claims
            .tenant_id
            .parse()
            .map_err(|_| ApiError::invalid_token("tenant_id claim is not a UUID"))?;

        Ok(Principal {
            tenant_id,
            user_id: claims.user_id,
            scopes: claims.scopes,
        })
    }

    /// Temporal validation with leeway.
    ///
    /// `nbf` slightly in the future and `exp` slightly in the past are
    /// tolerated within the configured skew.
    fn validate_times(&self, now: i64, exp: i64, nbf: Option<i64>) -> ApiResult<()> {
        if let Some(nbf) = nbf {
            if now + self.leeway_secs < nbf {
                return Err(ApiError::invalid_token("Token not yet valid (nbf)"));
            }
        }
        if exp < now - self.leeway_secs {
            return Err(ApiError::token_expired());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkeys;
    use uuid::Uuid;

    const TENANT: &str = "11111111-1111-1111-1111-111111111111";
    const NOW: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

    fn validator_at(now: i64) -> TokenValidator {
        TokenValidator::new(AuthConfig {
            public_key_pem: testkeys::PUBLIC_KEY_PEM.to_string(),
            issuer: testkeys::ISSUER.to_string(),
            audience: testkeys::AUDIENCE.to_string(),
            leeway_secs: 0,
            clock: Arc::new(FixedClock(now)),
        })
        .expect("validator builds from embedded key")
    }

    #[test]
    fn valid_token_yields_principal() {
        let token = testkeys::sign_token(TENANT, "alice", &["read", "write"], NOW + 3600);
        let principal = validator_at(NOW).validate(&token).expect("token is valid");

        assert_eq!(principal.tenant_id, TENANT.parse::<TenantId>().unwrap());
        assert_eq!(principal.user_id, "alice");
        assert!(principal.has_scope("read"));
        assert!(principal.has_scope("write"));
        assert!(!principal.has_scope("admin"));
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW + 3600);
        let v = validator_at(NOW);
        assert!(v.validate(&token).is_ok());
        assert!(v.validate(&format!("Bearer {}", token)).is_ok());
    }

    #[test]
    fn expired_by_one_second_is_rejected() {
        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW - 1);
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TokenExpired);
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let token = testkeys::sign_token_full(
            TENANT,
            "alice",
            &["read"],
            NOW + 3600,
            testkeys::ISSUER,
            "some-other-service",
        );
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert!(err.message.contains("audience"));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let token = testkeys::sign_token_full(
            TENANT,
            "alice",
            &["read"],
            NOW + 3600,
            "rogue-issuer",
            testkeys::AUDIENCE,
        );
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert!(err.message.contains("issuer"));
    }

    #[test]
    fn symmetric_tokens_are_rejected() {
        // HS256 token keyed on the public key bytes: the classic
        // key-confusion attempt.
        let token = testkeys::sign_hs256_token(TENANT, "mallory", NOW + 3600);
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidToken);
    }

    #[test]
    fn missing_tenant_is_rejected() {
        let token = testkeys::sign_token("", "alice", &["read"], NOW + 3600);
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert!(err.message.contains("tenant_id"));
    }

    #[test]
    fn non_uuid_tenant_is_rejected() {
        let token = testkeys::sign_token("acme-corp", "alice", &["read"], NOW + 3600);
        let err = validator_at(NOW).validate(&token).unwrap_err();
        assert!(err.message.contains("UUID"));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let err = validator_at(NOW).validate("not.a.jwt").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidToken);
    }

    #[test]
    fn leeway_tolerates_slight_expiry() {
        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW - 30);
        let v = TokenValidator::new(AuthConfig {
            public_key_pem: testkeys::PUBLIC_KEY_PEM.to_string(),
            issuer: testkeys::ISSUER.to_string(),
            audience: testkeys::AUDIENCE.to_string(),
            leeway_secs: 60,
            clock: Arc::new(FixedClock(NOW)),
        })
        .expect("validator");
        assert!(v.validate(&token).is_ok());
    }

    #[test]
    fn audience_matching_handles_arrays() {
        let aud = Audience::Many(vec!["a".into(), "waypoint-mcp".into()]);
        assert!(aud.contains("waypoint-mcp"));
        assert!(!aud.contains("b"));

        let aud = Audience::One("waypoint-mcp".into());
        assert!(aud.contains("waypoint-mcp"));
    }

    #[test]
    fn principal_is_per_request_data() {
        let principal = Principal {
            tenant_id: TenantId::new(Uuid::nil()),
            user_id: "u".into(),
            scopes: vec![],
        };
        // Cloning is cheap and the type carries no handles.
        let _copy = principal.clone();
    }
}
