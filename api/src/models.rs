//! API Models

use serde::{Deserialize, Serialize};
use tenant_governance::{Role, RoleAssignment};
use utoipa::ToSchema;

use crate::middleware::Caller;

/// Caller's own membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    /// Tenant from the token
    pub tenant_id: String,
    /// User from the token
    pub user_id: String,
    /// Email claim, if present
    pub email: Option<String>,
    /// Effective role, including the implicit primary-admin owner
    pub role: Role,
}

impl From<&Caller> for MemberProfile {
    fn from(caller: &Caller) -> Self {
        Self {
            tenant_id: caller.ctx.tenant_id().to_string(),
            user_id: caller.ctx.user_id().to_string(),
            email: caller.ctx.email().map(str::to_string),
            role: caller.role,
        }
    }
}

/// Stored membership row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Member's user id
    pub user_id: String,
    /// Assigned role
    pub role: Role,
}

impl From<RoleAssignment> for Member {
    fn from(assignment: RoleAssignment) -> Self {
        Self {
            user_id: assignment.user_id,
            role: assignment.role,
        }
    }
}

/// Role change request; the name is validated by the handler
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    /// `owner`, `admin` or `viewer`
    pub role: String,
}
