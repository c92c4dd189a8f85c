//! Tenant Governance API
//!
//! axum host for the governance pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           GOVERNANCE API                                │
//! │                                                                         │
//! │  /health   /api-docs/openapi.json          (never authorized/limited)   │
//! │                                                                         │
//! │  ┌──────────────┐   ┌─────────────────────────────────────────────┐    │
//! │  │ Bearer token │──▶│  govern (per-route policy)                  │    │
//! │  │ HS256 verify │   │  normalizer ⊃ extract → authorize → limit   │    │
//! │  └──────────────┘   └──────────────────────┬──────────────────────┘    │
//! │                                            ▼                            │
//! │            /api/v1/members/*  |  /api/v1/quota   (handlers)             │
//! │                                                                         │
//! │  X-RateLimit-* | Retry-After | X-Correlation-Id                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

use axum::routing::{delete, get, put};
use axum::Router;
use std::sync::Arc;
use tenant_governance::{
    ErrorEnvelope, GovernanceConfig, GovernancePipeline, InMemoryRoleStore, InMemoryTierProvider,
    MembershipGuard, QuotaSnapshot, RoleAdminStore, RoleAssignment, RoleStore, Role, Tier,
    TierProvider,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub use error::ApiError;
pub use middleware::{Caller, TokenVerifier};
pub use models::*;

/// API state
pub struct ApiState {
    /// Governance chain applied to every `/api/v1` route
    pub pipeline: GovernancePipeline,
    /// Role-management write path
    pub members: MembershipGuard,
    /// Upstream token verification
    pub verifier: TokenVerifier,
}

impl ApiState {
    /// Wire the state over the given stores
    pub fn new<S: RoleAdminStore + 'static>(
        config: &GovernanceConfig,
        roles: Arc<S>,
        tiers: Arc<dyn TierProvider>,
    ) -> Self {
        let reader: Arc<dyn RoleStore> = roles.clone();
        Self {
            pipeline: GovernancePipeline::from_config(config, reader, tiers),
            members: MembershipGuard::new(roles),
            verifier: TokenVerifier::new(&config.jwt_secret, &config.jwt_issuer),
        }
    }

    /// State over in-memory stores seeded from `config.tenants`
    pub fn in_memory(config: &GovernanceConfig) -> Self {
        let (roles, tiers) = seed_stores(config);
        Self::new(config, roles, tiers)
    }
}

/// Build in-memory stores from the configured seed tenants
pub fn seed_stores(config: &GovernanceConfig) -> (Arc<InMemoryRoleStore>, Arc<InMemoryTierProvider>) {
    let roles = Arc::new(InMemoryRoleStore::new());
    let tiers = Arc::new(InMemoryTierProvider::new());

    for tenant in &config.tenants {
        tiers.set_tier(&tenant.id, tenant.tier);
        if let Some(email) = &tenant.primary_admin_email {
            roles.set_primary_admin(&tenant.id, email);
        }
        for (user_id, role_name) in &tenant.members {
            if role_name.parse::<Role>().is_err() {
                tracing::warn!(tenant_id = %tenant.id, user_id, role = %role_name, "seeded member has unrecognized role");
            }
            roles.insert_raw(&tenant.id, user_id, role_name);
        }
        tracing::debug!(tenant_id = %tenant.id, tier = %tenant.tier, members = tenant.members.len(), "tenant seeded");
    }

    (roles, tiers)
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tenant Governance API",
        version = "0.1.0",
        description = "Tenant-scoped authorization, per-tenant rate limiting and uniform error envelopes",
        license(name = "Apache-2.0")
    ),
    paths(
        routes::health::health_check,
        routes::members::me,
        routes::members::list_members,
        routes::members::assign_role,
        routes::members::remove_member,
        routes::quota::get_quota,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            MemberProfile, Member, AssignRoleRequest,
            ErrorEnvelope, QuotaSnapshot, RoleAssignment, Role, Tier
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "members", description = "Tenant membership and roles"),
        (name = "quota", description = "Per-tenant rate limit visibility")
    )
)]
pub struct ApiDoc;

/// Background task dropping rate windows of idle tenants
pub async fn window_sweeper_task(state: Arc<ApiState>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        state.pipeline.limiter().purge_expired().await;
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(routes::docs::openapi_json))
        .nest("/api/v1", api_routes(&state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
    use tenant_governance::Policy;

    let viewer = Router::new()
        .route("/members/me", get(routes::members::me))
        .route("/quota", get(routes::quota::get_quota));

    let admin = Router::new().route("/members", get(routes::members::list_members));

    let member_writes = Router::new()
        .route("/members/:user_id/role", put(routes::members::assign_role))
        .route("/members/:user_id", delete(routes::members::remove_member));

    middleware::with_policy(state, Policy::REQUIRE_VIEWER, viewer)
        .merge(middleware::with_policy(state, Policy::REQUIRE_ADMIN, admin))
        .merge(middleware::with_member_policy(state, Policy::REQUIRE_ADMIN, member_writes))
}
