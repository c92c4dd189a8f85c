//! Role Authorization
//!
//! Resolves the caller's effective role from exactly one source:
//!
//! 1. primary-admin email match (bootstrap owner)
//! 2. explicit [`RoleAssignment`] from the [`RoleStore`]
//! 3. nothing: the request is denied, never defaulted to `Viewer`
//!
//! [`MembershipGuard`] wraps the role-management write path.

use std::sync::Arc;

use crate::context::TenantContext;
use crate::error::{ErrorKind, GovernanceResult, StoreError};
use crate::model::{Policy, Role, RoleAssignment};
use crate::store::{RoleAdminStore, RoleStore};

/// A normal deny outcome, surfaced directly as a terminal response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Error kind
    pub kind: ErrorKind,
    /// HTTP status
    pub status: u16,
    /// Caller-facing message
    pub message: String,
}

impl Denial {
    /// Denial with the kind's default status
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status(),
            message: message.into(),
        }
    }
}

/// Authorization outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzDecision {
    /// Admitted with the effective role
    Allow(Role),
    /// Rejected
    Deny(Denial),
}

impl AuthzDecision {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Where the effective role came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    /// Email matched the tenant's primary admin
    PrimaryAdmin,
    /// Stored assignment
    Assigned(Role),
    /// Stored assignment holds an unrecognized role name
    Unrecognized(String),
    /// No membership
    Absent,
}

impl RoleResolution {
    /// Effective role, if any
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::PrimaryAdmin => Some(Role::Owner),
            Self::Assigned(role) => Some(*role),
            Self::Unrecognized(_) | Self::Absent => None,
        }
    }
}

/// Claims-derived role authorization
#[derive(Clone)]
pub struct RoleAuthorizationEngine {
    store: Arc<dyn RoleStore>,
}

impl RoleAuthorizationEngine {
    /// Create engine over a role store
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    /// Resolve the caller's effective role within their own tenant
    pub async fn resolve_role(&self, ctx: &TenantContext) -> GovernanceResult<RoleResolution> {
        if let Some(email) = ctx.email() {
            let primary = self.store.get_primary_admin_email(ctx.tenant_id()).await?;
            if primary.is_some_and(|p| p.trim().eq_ignore_ascii_case(email.trim())) {
                return Ok(RoleResolution::PrimaryAdmin);
            }
        }

        match self.store.get_role(ctx.tenant_id(), ctx.user_id()).await {
            Ok(Some(role)) => Ok(RoleResolution::Assigned(role)),
            Ok(None) => Ok(RoleResolution::Absent),
            Err(StoreError::InvalidRole(raw)) => Ok(RoleResolution::Unrecognized(raw)),
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluate `policy` for the caller
    pub async fn authorize(&self, ctx: &TenantContext, policy: Policy) -> GovernanceResult<AuthzDecision> {
        let resolution = self.resolve_role(ctx).await?;
        let decision = decide(&resolution, policy);

        if let AuthzDecision::Deny(denial) = &decision {
            tracing::debug!(
                tenant_id = ctx.tenant_id(),
                user_id = ctx.user_id(),
                policy = policy.name(),
                code = denial.kind.code(),
                "authorization denied"
            );
        }
        Ok(decision)
    }
}

fn decide(resolution: &RoleResolution, policy: Policy) -> AuthzDecision {
    let role = match resolution {
        RoleResolution::PrimaryAdmin => Role::Owner,
        RoleResolution::Assigned(role) => *role,
        RoleResolution::Unrecognized(raw) => {
            return AuthzDecision::Deny(Denial::new(
                ErrorKind::UnrecognizedRole,
                format!("stored role {raw:?} is not recognized"),
            ));
        }
        RoleResolution::Absent => {
            return AuthzDecision::Deny(Denial::new(
                ErrorKind::UserNotFound,
                "User is not a member of this tenant",
            ));
        }
    };

    if policy.allows(role) {
        AuthzDecision::Allow(role)
    } else {
        AuthzDecision::Deny(Denial::new(
            ErrorKind::InsufficientPermissions,
            format!("Role '{role}' does not satisfy policy '{policy}'"),
        ))
    }
}

/// Write on another member's assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMutation {
    /// Role change
    ChangeRole,
    /// Membership removal
    Remove,
}

impl MemberMutation {
    fn self_denial(self) -> Denial {
        match self {
            Self::ChangeRole => Denial::new(ErrorKind::CannotModifySelf, "You cannot change your own role"),
            Self::Remove => Denial::new(ErrorKind::CannotRemoveSelf, "You cannot remove yourself from the tenant"),
        }
    }
}

/// Refuse `mutation` when the actor targets their own membership.
///
/// Runs ahead of role resolution, so it applies to members of any role
/// and to callers with no membership at all.
pub fn check_self_mutation(actor: &TenantContext, target_user_id: &str, mutation: MemberMutation) -> Option<Denial> {
    (target_user_id == actor.user_id()).then(|| mutation.self_denial())
}

/// Outcome of a role-management operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipDecision {
    /// Assignment written
    Assigned(RoleAssignment),
    /// Assignment deleted
    Removed {
        /// Removed user
        user_id: String,
    },
    /// Operation refused
    Rejected(Denial),
}

/// Guards the role-management write path.
///
/// Self-mutation is refused before any role check. All reads and writes
/// are scoped to the actor's tenant.
pub struct MembershipGuard {
    store: Arc<dyn RoleAdminStore>,
    engine: RoleAuthorizationEngine,
}

impl MembershipGuard {
    /// Create guard; the engine reads through the same store
    pub fn new<S: RoleAdminStore + 'static>(store: Arc<S>) -> Self {
        Self {
            engine: RoleAuthorizationEngine::new(store.clone()),
            store,
        }
    }

    /// Engine used for the guard's authorization checks
    pub fn engine(&self) -> &RoleAuthorizationEngine {
        &self.engine
    }

    /// Assign `role_name` to `target_user_id` within the actor's tenant
    pub async fn assign_role(
        &self,
        actor: &TenantContext,
        target_user_id: &str,
        role_name: &str,
    ) -> GovernanceResult<MembershipDecision> {
        if let Some(denial) = check_self_mutation(actor, target_user_id, MemberMutation::ChangeRole) {
            return Ok(MembershipDecision::Rejected(denial));
        }

        let role = match role_name.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                return Ok(MembershipDecision::Rejected(Denial::new(
                    ErrorKind::InvalidRole,
                    e.to_string(),
                )))
            }
        };

        let actor_role = match self.engine.authorize(actor, Policy::REQUIRE_ADMIN).await? {
            AuthzDecision::Allow(role) => role,
            AuthzDecision::Deny(denial) => return Ok(MembershipDecision::Rejected(denial)),
        };

        let current = match self.store.get_role(actor.tenant_id(), target_user_id).await {
            Ok(current) => current,
            Err(StoreError::InvalidRole(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let touches_owner = role == Role::Owner || current == Some(Role::Owner);
        if touches_owner && actor_role != Role::Owner {
            return Ok(MembershipDecision::Rejected(Denial::new(
                ErrorKind::InsufficientPermissions,
                "Only an owner can grant or revoke the owner role",
            )));
        }

        let assignment = RoleAssignment::new(actor.tenant_id(), target_user_id, role);
        self.store.upsert_assignment(assignment.clone()).await?;

        tracing::info!(
            tenant_id = actor.tenant_id(),
            actor = actor.user_id(),
            target = target_user_id,
            role = %role,
            "role assigned"
        );
        Ok(MembershipDecision::Assigned(assignment))
    }

    /// Remove `target_user_id`'s membership within the actor's tenant
    pub async fn remove_member(
        &self,
        actor: &TenantContext,
        target_user_id: &str,
    ) -> GovernanceResult<MembershipDecision> {
        if let Some(denial) = check_self_mutation(actor, target_user_id, MemberMutation::Remove) {
            return Ok(MembershipDecision::Rejected(denial));
        }

        let actor_role = match self.engine.authorize(actor, Policy::REQUIRE_ADMIN).await? {
            AuthzDecision::Allow(role) => role,
            AuthzDecision::Deny(denial) => return Ok(MembershipDecision::Rejected(denial)),
        };

        let target_role = match self.store.get_role(actor.tenant_id(), target_user_id).await {
            Ok(Some(role)) => Some(role),
            Ok(None) => {
                return Ok(MembershipDecision::Rejected(Denial::new(
                    ErrorKind::NotFound,
                    format!("No membership for user '{target_user_id}'"),
                )))
            }
            // A corrupt row may still be removed by an admin.
            Err(StoreError::InvalidRole(_)) => None,
            Err(e) => return Err(e.into()),
        };

        if target_role == Some(Role::Owner) && actor_role != Role::Owner {
            return Ok(MembershipDecision::Rejected(Denial::new(
                ErrorKind::InsufficientPermissions,
                "Only an owner can grant or revoke the owner role",
            )));
        }

        if !self.store.remove_assignment(actor.tenant_id(), target_user_id).await? {
            return Ok(MembershipDecision::Rejected(Denial::new(
                ErrorKind::NotFound,
                format!("No membership for user '{target_user_id}'"),
            )));
        }

        tracing::info!(
            tenant_id = actor.tenant_id(),
            actor = actor.user_id(),
            target = target_user_id,
            "member removed"
        );
        Ok(MembershipDecision::Removed {
            user_id: target_user_id.to_string(),
        })
    }

    /// Stored assignments of the actor's tenant (requires admin)
    pub async fn list_members(
        &self,
        actor: &TenantContext,
    ) -> GovernanceResult<Result<Vec<RoleAssignment>, Denial>> {
        match self.engine.authorize(actor, Policy::REQUIRE_ADMIN).await? {
            AuthzDecision::Allow(_) => Ok(Ok(self.store.list_assignments(actor.tenant_id()).await?)),
            AuthzDecision::Deny(denial) => Ok(Err(denial)),
        }
    }
}
