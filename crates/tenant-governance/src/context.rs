//! Tenant Context Extraction
//!
//! Turns an already-verified claim set into the immutable per-request
//! [`TenantContext`]. Signature and expiry checks belong to the upstream
//! authentication stage.

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, GovernanceResult};

/// Claims consumed from a verified bearer token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Tenant identifier claim
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// User identifier (`sub`)
    #[serde(default, rename = "sub")]
    pub user_id: Option<String>,
    /// User email
    #[serde(default)]
    pub email: Option<String>,
}

impl ClaimSet {
    /// Claim set with tenant and user
    pub fn new(tenant_id: &str, user_id: &str) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            user_id: Some(user_id.to_string()),
            email: None,
        }
    }

    /// Attach an email claim
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

/// Identity of the caller for the lifetime of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    tenant_id: String,
    user_id: String,
    email: Option<String>,
}

impl TenantContext {
    /// Tenant id
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// User id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// User email, if the token carried one
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Derives [`TenantContext`] from claims. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContextExtractor;

impl TenantContextExtractor {
    /// Create extractor
    pub fn new() -> Self {
        Self
    }

    /// Build the context; absent or blank tenant/user claims are terminal.
    pub fn extract(&self, claims: &ClaimSet) -> GovernanceResult<TenantContext> {
        let tenant_id = non_blank(claims.tenant_id.as_deref())
            .ok_or_else(|| GovernanceError::Auth("Missing tenant claim".into()))?;
        let user_id = non_blank(claims.user_id.as_deref())
            .ok_or_else(|| GovernanceError::Auth("Missing user claim".into()))?;

        Ok(TenantContext {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            email: non_blank(claims.email.as_deref()).map(str::to_string),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_extracts_all_claims() {
        let claims = ClaimSet::new("tenant-a", "user-1").with_email("a@example.com");
        let ctx = TenantContextExtractor::new().extract(&claims).unwrap();

        assert_eq!(ctx.tenant_id(), "tenant-a");
        assert_eq!(ctx.user_id(), "user-1");
        assert_eq!(ctx.email(), Some("a@example.com"));
    }

    #[test]
    fn test_email_is_optional() {
        let ctx = TenantContextExtractor::new()
            .extract(&ClaimSet::new("tenant-a", "user-1"))
            .unwrap();
        assert_eq!(ctx.email(), None);
    }

    #[test]
    fn test_missing_tenant_claim() {
        let claims = ClaimSet {
            tenant_id: None,
            user_id: Some("user-1".into()),
            email: None,
        };
        let err = TenantContextExtractor::new().extract(&claims).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(err.to_string(), "Missing tenant claim");
    }

    #[test]
    fn test_blank_tenant_claim_is_missing() {
        let claims = ClaimSet::new("   ", "user-1");
        let err = TenantContextExtractor::new().extract(&claims).unwrap_err();
        assert_eq!(err.to_string(), "Missing tenant claim");
    }

    #[test]
    fn test_claims_deserialize_from_token_payload() {
        let claims: ClaimSet = serde_json::from_str(
            r#"{"sub":"user-9","tenant_id":"t-1","email":"x@y.io","exp":1}"#,
        )
        .unwrap();
        assert_eq!(claims, ClaimSet::new("t-1", "user-9").with_email("x@y.io"));
    }
}
