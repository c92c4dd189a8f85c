//! Bearer token verification
//!
//! Upstream authentication stage: signature, expiry and issuer are
//! checked here, before the governance pipeline sees the claims.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tenant_governance::{ClaimSet, GovernanceError, GovernanceResult};

/// HS256 verifier for the upstream issuer
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Verifier for tokens signed with `secret` and issued by `issuer`
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token and return its claims
    pub fn verify(&self, token: &str) -> GovernanceResult<ClaimSet> {
        decode::<ClaimSet>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                GovernanceError::Auth("Invalid or expired token".into())
            })
    }

    /// Verify the `Authorization: Bearer` header
    pub fn claims_from_headers(&self, headers: &HeaderMap) -> GovernanceResult<ClaimSet> {
        let token = bearer_token(headers)
            .ok_or_else(|| GovernanceError::Auth("Missing bearer token".into()))?;
        self.verify(token)
    }
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn token(claims: serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_verifies_claims() {
        let verifier = TokenVerifier::new(SECRET, "issuer-a");
        let raw = token(
            json!({"sub": "u-1", "tenant_id": "acme", "email": "u@acme.io", "iss": "issuer-a", "exp": exp()}),
            SECRET,
        );

        let claims = verifier.verify(&raw).unwrap();
        assert_eq!(claims, ClaimSet::new("acme", "u-1").with_email("u@acme.io"));
    }

    #[test]
    fn test_token_without_tenant_still_verifies() {
        let verifier = TokenVerifier::new(SECRET, "issuer-a");
        let raw = token(json!({"sub": "u-1", "iss": "issuer-a", "exp": exp()}), SECRET);

        assert_eq!(verifier.verify(&raw).unwrap().tenant_id, None);
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let verifier = TokenVerifier::new(SECRET, "issuer-a");

        let wrong_secret = token(json!({"sub": "u", "iss": "issuer-a", "exp": exp()}), "other");
        let wrong_issuer = token(json!({"sub": "u", "iss": "issuer-b", "exp": exp()}), SECRET);
        let expired = token(json!({"sub": "u", "iss": "issuer-a", "exp": 1_000}), SECRET);
        let no_exp = token(json!({"sub": "u", "iss": "issuer-a"}), SECRET);

        for raw in [wrong_secret, wrong_issuer, expired, no_exp, "garbage".to_string()] {
            let err = verifier.verify(&raw).unwrap_err();
            assert_eq!(err.to_string(), "Invalid or expired token");
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_missing_header_is_auth_error() {
        let verifier = TokenVerifier::new(SECRET, "issuer-a");
        let err = verifier.claims_from_headers(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Missing bearer token");
    }
}
