//! Governance Data Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant role.
///
/// Declared in ascending privilege so the derived ordering gives
/// `Owner > Admin > Viewer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only member
    Viewer,
    /// Tenant administrator
    Admin,
    /// Tenant owner
    Owner,
}

impl Role {
    /// All roles, highest privilege first
    pub const ALL: [Role; 3] = [Role::Owner, Role::Admin, Role::Viewer];

    /// Canonical storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role name that does not map onto [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized role: {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free plan
    Free,
    /// Starter plan
    Starter,
    /// Pro plan
    Pro,
    /// Enterprise plan
    Enterprise,
}

impl Tier {
    /// Every tier in the closed set
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Starter, Tier::Pro, Tier::Enterprise];

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unrecognized tier: {other:?}")),
        }
    }
}

/// Static, named set of roles allowed to invoke a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    name: &'static str,
    allowed: &'static [Role],
}

impl Policy {
    /// Owners only
    pub const REQUIRE_OWNER: Policy = Policy {
        name: "RequireOwner",
        allowed: &[Role::Owner],
    };

    /// Owners and admins
    pub const REQUIRE_ADMIN: Policy = Policy {
        name: "RequireAdmin",
        allowed: &[Role::Owner, Role::Admin],
    };

    /// Any member
    pub const REQUIRE_VIEWER: Policy = Policy {
        name: "RequireViewer",
        allowed: &[Role::Owner, Role::Admin, Role::Viewer],
    };

    /// Look up a standard policy by its fixed identifier
    pub fn from_name(name: &str) -> Option<Policy> {
        [Self::REQUIRE_OWNER, Self::REQUIRE_ADMIN, Self::REQUIRE_VIEWER]
            .into_iter()
            .find(|p| p.name == name)
    }

    /// Policy identifier
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allowed roles, in declaration order
    pub fn allowed_roles(&self) -> &'static [Role] {
        self.allowed
    }

    /// Whether `role` satisfies this policy
    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Explicit membership row for a user within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleAssignment {
    /// Owning tenant
    pub tenant_id: String,
    /// Member user id
    pub user_id: String,
    /// Assigned role
    pub role: Role,
    /// Set when this assignment stands for the bootstrap owner
    pub is_primary_admin: bool,
}

impl RoleAssignment {
    /// Stored (non-bootstrap) assignment
    pub fn new(tenant_id: &str, user_id: &str, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            role,
            is_primary_admin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Viewer);
        assert_eq!(Role::ALL.iter().max(), Some(&Role::Owner));
    }

    #[test]
    fn test_role_parsing_rejects_unknown() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" owner ".parse::<Role>(), Ok(Role::Owner));
        assert_eq!(
            "superuser".parse::<Role>(),
            Err(UnknownRole("superuser".into()))
        );
    }

    #[test]
    fn test_standard_policies() {
        assert!(Policy::REQUIRE_ADMIN.allows(Role::Owner));
        assert!(Policy::REQUIRE_ADMIN.allows(Role::Admin));
        assert!(!Policy::REQUIRE_ADMIN.allows(Role::Viewer));
        assert!(!Policy::REQUIRE_OWNER.allows(Role::Admin));
        assert!(Role::ALL.iter().all(|r| Policy::REQUIRE_VIEWER.allows(*r)));

        assert_eq!(Policy::from_name("RequireOwner"), Some(Policy::REQUIRE_OWNER));
        assert_eq!(Policy::from_name("RequireRoot"), None);
    }
}
