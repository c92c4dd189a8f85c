//! Collaborator interfaces - role and tier lookups
//!
//! Persistence of tenants, roles and tiers lives outside this crate.
//! The pipeline only reads through these traits; the in-memory
//! implementations back development servers and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::model::{Role, RoleAssignment, Tier};

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Read side of tenant membership
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Explicit role of `user_id` within `tenant_id`.
    ///
    /// Stored names are parsed here; unrecognized ones surface as
    /// [`StoreError::InvalidRole`].
    async fn get_role(&self, tenant_id: &str, user_id: &str) -> StoreResult<Option<Role>>;

    /// Email of the tenant's bootstrap owner
    async fn get_primary_admin_email(&self, tenant_id: &str) -> StoreResult<Option<String>>;
}

/// Write side used by the role-management path
#[async_trait]
pub trait RoleAdminStore: RoleStore {
    /// Insert or replace the assignment for (tenant, user)
    async fn upsert_assignment(&self, assignment: RoleAssignment) -> StoreResult<()>;

    /// Delete the assignment; `false` when none existed
    async fn remove_assignment(&self, tenant_id: &str, user_id: &str) -> StoreResult<bool>;

    /// All stored assignments of one tenant
    async fn list_assignments(&self, tenant_id: &str) -> StoreResult<Vec<RoleAssignment>>;
}

/// Subscription tier lookup
#[async_trait]
pub trait TierProvider: Send + Sync {
    /// Current tier of the tenant
    async fn get_tier(&self, tenant_id: &str) -> StoreResult<Tier>;
}

/// In-memory role store.
///
/// Rows hold raw role names, as an external database would, and are
/// parsed on every read.
#[derive(Default)]
pub struct InMemoryRoleStore {
    /// tenant → (user → role name)
    roles: RwLock<HashMap<String, HashMap<String, String>>>,
    /// tenant → primary admin email
    primary_admins: RwLock<HashMap<String, String>>,
}

impl InMemoryRoleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bootstrap owner email of a tenant
    pub fn set_primary_admin(&self, tenant_id: &str, email: &str) {
        self.primary_admins
            .write()
            .insert(tenant_id.to_string(), email.to_string());
    }

    /// Store a raw role name without validation
    pub fn insert_raw(&self, tenant_id: &str, user_id: &str, role_name: &str) {
        self.roles
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .insert(user_id.to_string(), role_name.to_string());
    }

    /// Store a typed role
    pub fn assign(&self, tenant_id: &str, user_id: &str, role: Role) {
        self.insert_raw(tenant_id, user_id, role.as_str());
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, tenant_id: &str, user_id: &str) -> StoreResult<Option<Role>> {
        let roles = self.roles.read();
        let Some(raw) = roles.get(tenant_id).and_then(|members| members.get(user_id)) else {
            return Ok(None);
        };
        raw.parse::<Role>()
            .map(Some)
            .map_err(|e| StoreError::InvalidRole(e.0))
    }

    async fn get_primary_admin_email(&self, tenant_id: &str) -> StoreResult<Option<String>> {
        Ok(self.primary_admins.read().get(tenant_id).cloned())
    }
}

#[async_trait]
impl RoleAdminStore for InMemoryRoleStore {
    async fn upsert_assignment(&self, assignment: RoleAssignment) -> StoreResult<()> {
        self.assign(&assignment.tenant_id, &assignment.user_id, assignment.role);
        Ok(())
    }

    async fn remove_assignment(&self, tenant_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut roles = self.roles.write();
        Ok(roles
            .get_mut(tenant_id)
            .map(|members| members.remove(user_id).is_some())
            .unwrap_or(false))
    }

    async fn list_assignments(&self, tenant_id: &str) -> StoreResult<Vec<RoleAssignment>> {
        let roles = self.roles.read();
        let Some(members) = roles.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut assignments = members
            .iter()
            .map(|(user_id, raw)| {
                raw.parse::<Role>()
                    .map(|role| RoleAssignment::new(tenant_id, user_id, role))
                    .map_err(|e| StoreError::InvalidRole(e.0))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        assignments.sort_by(|a, b| b.role.cmp(&a.role).then_with(|| a.user_id.cmp(&b.user_id)));
        Ok(assignments)
    }
}

/// In-memory tier table
#[derive(Default)]
pub struct InMemoryTierProvider {
    tiers: RwLock<HashMap<String, Tier>>,
}

impl InMemoryTierProvider {
    /// Empty provider; every lookup fails until tiers are set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tenant's tier
    pub fn set_tier(&self, tenant_id: &str, tier: Tier) {
        self.tiers.write().insert(tenant_id.to_string(), tier);
    }
}

#[async_trait]
impl TierProvider for InMemoryTierProvider {
    async fn get_tier(&self, tenant_id: &str) -> StoreResult<Tier> {
        self.tiers
            .read()
            .get(tenant_id)
            .copied()
            .ok_or_else(|| StoreError::UnknownTenant(tenant_id.to_string()))
    }
}
