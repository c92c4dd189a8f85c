//! Governance Pipeline
//!
//! Fixed composition: Normalizer ⊃ Extractor → Authorizer → RateLimiter →
//! handler. Deny outcomes are return values; only residual faults go
//! through the normalizer.
//!
//! Requests that write another member's assignment carry their target,
//! and a caller targeting themselves is refused right after extraction,
//! ahead of the route policy.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use crate::authz::{check_self_mutation, AuthzDecision, Denial, MemberMutation, RoleAuthorizationEngine};
use crate::config::{path_is_excluded, GovernanceConfig};
use crate::context::{ClaimSet, TenantContext, TenantContextExtractor};
use crate::error::{DownstreamError, ErrorKind, GovernanceError};
use crate::model::{Policy, Role};
use crate::normalizer::{ErrorEnvelope, ExceptionNormalizer, Fault, LogScope};
use crate::ratelimit::{InMemoryWindowStore, RateLimitDecision, TenantRateLimiter};
use crate::store::{RoleStore, TierProvider};

/// Terminal error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status
    pub status: u16,
    /// Error body
    pub envelope: ErrorEnvelope,
    /// Seconds until quota frees up, on 429 only
    pub retry_after: Option<u64>,
}

impl Rejection {
    /// Response for a normal deny outcome
    pub fn from_denial(denial: Denial) -> Self {
        Self {
            status: denial.status,
            envelope: ErrorEnvelope::new(denial.kind, denial.message),
            retry_after: None,
        }
    }

    /// 429 for an exhausted quota
    pub fn rate_limited(decision: &RateLimitDecision) -> Self {
        let retry_after = decision.retry_after_seconds.unwrap_or(1);
        Self {
            status: ErrorKind::RateLimitExceeded.status(),
            envelope: ErrorEnvelope::new(
                ErrorKind::RateLimitExceeded,
                format!(
                    "Rate limit of {} requests per window exceeded for tier '{}'. Retry in {} seconds.",
                    decision.limit, decision.tier, retry_after
                ),
            ),
            retry_after: Some(retry_after),
        }
    }

    /// Wire code
    pub fn code(&self) -> &str {
        &self.envelope.code
    }
}

/// One inbound request as seen by the pipeline
#[derive(Debug)]
pub struct GovernedRequest {
    /// Request path, for exclusion and logging
    pub path: String,
    /// Route policy
    pub policy: Policy,
    /// Claims from the upstream authentication stage, or its failure
    pub claims: Result<ClaimSet, GovernanceError>,
    /// Member whose assignment the request writes
    pub target: Option<(String, MemberMutation)>,
}

impl GovernedRequest {
    /// Request with verified claims
    pub fn new(path: impl Into<String>, policy: Policy, claims: ClaimSet) -> Self {
        Self {
            path: path.into(),
            policy,
            claims: Ok(claims),
            target: None,
        }
    }

    /// Request whose authentication already failed
    pub fn unauthenticated(path: impl Into<String>, policy: Policy, err: GovernanceError) -> Self {
        Self {
            path: path.into(),
            policy,
            claims: Err(err),
            target: None,
        }
    }

    /// Mark the request as writing `user_id`'s membership
    pub fn with_member_target(mut self, user_id: impl Into<String>, mutation: MemberMutation) -> Self {
        self.target = Some((user_id.into(), mutation));
        self
    }
}

/// Pipeline result plus quota visibility
#[derive(Debug)]
pub struct GovernedResponse<T> {
    /// Handler value or terminal rejection
    pub outcome: Result<T, Rejection>,
    /// Set whenever the request was charged
    pub quota: Option<RateLimitDecision>,
}

/// The per-request governance chain
pub struct GovernancePipeline {
    extractor: TenantContextExtractor,
    authorizer: RoleAuthorizationEngine,
    limiter: Arc<TenantRateLimiter>,
    normalizer: ExceptionNormalizer,
    excluded_paths: Vec<String>,
}

impl GovernancePipeline {
    /// Assemble from components
    pub fn new(
        authorizer: RoleAuthorizationEngine,
        limiter: Arc<TenantRateLimiter>,
        normalizer: ExceptionNormalizer,
    ) -> Self {
        Self {
            extractor: TenantContextExtractor::new(),
            authorizer,
            limiter,
            normalizer,
            excluded_paths: Vec::new(),
        }
    }

    /// Assemble from configuration with an in-process window store
    pub fn from_config(
        config: &GovernanceConfig,
        roles: Arc<dyn RoleStore>,
        tiers: Arc<dyn TierProvider>,
    ) -> Self {
        let limiter = TenantRateLimiter::new(
            Arc::new(InMemoryWindowStore::new()),
            tiers,
            config.tier_limits.clone(),
            config.window(),
        );
        Self::new(
            RoleAuthorizationEngine::new(roles),
            Arc::new(limiter),
            ExceptionNormalizer::new(config.environment),
        )
        .with_excluded_paths(config.excluded_paths.clone())
    }

    /// Paths that skip rate limiting
    pub fn with_excluded_paths(mut self, paths: Vec<String>) -> Self {
        self.excluded_paths = paths;
        self
    }

    /// Rate limiter
    pub fn limiter(&self) -> &Arc<TenantRateLimiter> {
        &self.limiter
    }

    /// Authorization engine
    pub fn authorizer(&self) -> &RoleAuthorizationEngine {
        &self.authorizer
    }

    /// Normalizer
    pub fn normalizer(&self) -> &ExceptionNormalizer {
        &self.normalizer
    }

    /// Whether `path` bypasses rate limiting
    pub fn is_excluded(&self, path: &str) -> bool {
        path_is_excluded(&self.excluded_paths, path)
    }

    /// Govern one request and, if admitted, run `handler`
    pub async fn run<T, H, Fut>(&self, request: GovernedRequest, handler: H) -> GovernedResponse<T>
    where
        H: FnOnce(TenantContext, Role) -> Fut,
        Fut: Future<Output = Result<T, DownstreamError>>,
    {
        let scope = Mutex::new(LogScope::anonymous(&request.path));
        let quota = Mutex::new(None);

        let result = self
            .normalizer
            .catch(self.govern(request, handler, &scope, &quota))
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(fault) => Err(self.normalizer.normalize(&fault, &scope.lock())),
        };

        GovernedResponse {
            outcome,
            quota: quota.into_inner(),
        }
    }

    async fn govern<T, H, Fut>(
        &self,
        request: GovernedRequest,
        handler: H,
        scope: &Mutex<LogScope>,
        quota: &Mutex<Option<RateLimitDecision>>,
    ) -> Result<Result<T, Rejection>, Fault>
    where
        H: FnOnce(TenantContext, Role) -> Fut,
        Fut: Future<Output = Result<T, DownstreamError>>,
    {
        let claims = request.claims?;
        let ctx = self.extractor.extract(&claims)?;
        scope.lock().identify(&ctx);

        if let Some((target, mutation)) = &request.target {
            if let Some(denial) = check_self_mutation(&ctx, target, *mutation) {
                return Ok(Err(Rejection::from_denial(denial)));
            }
        }

        let role = match self.authorizer.authorize(&ctx, request.policy).await? {
            AuthzDecision::Allow(role) => role,
            AuthzDecision::Deny(denial) => return Ok(Err(Rejection::from_denial(denial))),
        };

        if !self.is_excluded(&request.path) {
            let decision = self.limiter.admit(&ctx).await;
            let allowed = decision.allowed;
            *quota.lock() = Some(decision.clone());
            if !allowed {
                return Ok(Err(Rejection::rate_limited(&decision)));
            }
        }

        let value = handler(ctx, role).await?;
        Ok(Ok(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, TierLimits};
    use crate::error::StoreError;
    use crate::model::Tier;
    use crate::ratelimit::ManualClock;
    use crate::store::{InMemoryRoleStore, InMemoryTierProvider, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        pipeline: GovernancePipeline,
        clock: Arc<ManualClock>,
    }

    fn fixture(environment: Environment, free_limit: u64) -> Fixture {
        let roles = Arc::new(InMemoryRoleStore::new());
        roles.set_primary_admin("acme", "founder@acme.io");
        roles.assign("acme", "admin-1", Role::Admin);
        roles.assign("acme", "viewer-1", Role::Viewer);
        roles.assign("globex", "viewer-1", Role::Viewer);

        let tiers = Arc::new(InMemoryTierProvider::new());
        tiers.set_tier("acme", Tier::Free);
        tiers.set_tier("globex", Tier::Free);

        let clock = Arc::new(ManualClock::new(T0));
        let limiter = TenantRateLimiter::new(
            Arc::new(InMemoryWindowStore::new()),
            tiers,
            TierLimits {
                free: free_limit,
                ..TierLimits::default()
            },
            Duration::from_secs(60),
        )
        .with_clock(clock.clone());

        let pipeline = GovernancePipeline::new(
            RoleAuthorizationEngine::new(roles),
            Arc::new(limiter),
            ExceptionNormalizer::new(environment),
        )
        .with_excluded_paths(vec!["/health".into()]);

        Fixture { pipeline, clock }
    }

    fn request(user: &str, policy: Policy) -> GovernedRequest {
        GovernedRequest::new("/api/v1/widgets", policy, ClaimSet::new("acme", user))
    }

    async fn ok_handler(ctx: TenantContext, role: Role) -> Result<String, DownstreamError> {
        Ok(format!("{}:{}", ctx.user_id(), role))
    }

    async fn panicking_handler(_ctx: TenantContext, _role: Role) -> Result<String, DownstreamError> {
        panic!("widget cache corrupted");
    }

    async fn plan_limited_handler(_ctx: TenantContext, _role: Role) -> Result<String, DownstreamError> {
        Err(DownstreamError::PlanLimitExceeded("plan limit exceeded".into()))
    }

    fn rejection<T: std::fmt::Debug>(response: GovernedResponse<T>) -> Rejection {
        response.outcome.unwrap_err()
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let f = fixture(Environment::Production, 100);

        let response = f.pipeline.run(request("admin-1", Policy::REQUIRE_VIEWER), ok_handler).await;
        assert_eq!(response.outcome.unwrap(), "admin-1:admin");

        let quota = response.quota.unwrap();
        assert!(quota.allowed);
        assert_eq!((quota.limit, quota.remaining), (100, 99));
    }

    #[tokio::test]
    async fn test_primary_admin_passes_require_owner() {
        let f = fixture(Environment::Production, 100);
        let claims = ClaimSet::new("acme", "founder").with_email("FOUNDER@acme.io");

        let response = f
            .pipeline
            .run(GovernedRequest::new("/api/v1/billing", Policy::REQUIRE_OWNER, claims), ok_handler)
            .await;
        assert_eq!(response.outcome.unwrap(), "founder:owner");
    }

    #[tokio::test]
    async fn test_missing_tenant_claim_is_401() {
        let f = fixture(Environment::Production, 100);
        let calls = AtomicUsize::new(0);
        let claims = ClaimSet {
            tenant_id: None,
            user_id: Some("admin-1".into()),
            email: None,
        };

        let response = f
            .pipeline
            .run(GovernedRequest::new("/api/v1/widgets", Policy::REQUIRE_VIEWER, claims), |ctx, role| {
                calls.fetch_add(1, Ordering::SeqCst);
                ok_handler(ctx, role)
            })
            .await;

        assert!(response.quota.is_none());
        let rejection = rejection(response);
        assert_eq!(rejection.status, 401);
        assert_eq!(rejection.code(), "AUTH_ERROR");
        assert_eq!(rejection.envelope.message, "Missing tenant claim");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_authentication_is_401() {
        let f = fixture(Environment::Production, 100);
        let req = GovernedRequest::unauthenticated(
            "/api/v1/widgets",
            Policy::REQUIRE_VIEWER,
            GovernanceError::Auth("Invalid or expired token".into()),
        );

        let rejection = rejection(f.pipeline.run(req, ok_handler).await);
        assert_eq!(rejection.status, 401);
        assert_eq!(rejection.envelope.message, "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_denied_requests_are_not_charged() {
        let f = fixture(Environment::Production, 100);

        let response = f.pipeline.run(request("viewer-1", Policy::REQUIRE_ADMIN), ok_handler).await;
        assert!(response.quota.is_none());
        let denied = rejection(response);
        assert_eq!(denied.status, 403);
        assert_eq!(denied.code(), "INSUFFICIENT_PERMISSIONS");

        let stranger = rejection(f.pipeline.run(request("stranger", Policy::REQUIRE_VIEWER), ok_handler).await);
        assert_eq!(stranger.code(), "USER_NOT_FOUND");

        let ctx = TenantContextExtractor::new()
            .extract(&ClaimSet::new("acme", "viewer-1"))
            .unwrap();
        assert_eq!(f.pipeline.limiter().snapshot(&ctx).await.used, 0);
    }

    #[tokio::test]
    async fn test_self_target_refused_before_policy() {
        let f = fixture(Environment::Production, 100);
        let cases = [
            ("viewer-1", MemberMutation::Remove, "CANNOT_REMOVE_SELF"),
            ("viewer-1", MemberMutation::ChangeRole, "CANNOT_MODIFY_SELF"),
            ("stranger", MemberMutation::Remove, "CANNOT_REMOVE_SELF"),
        ];

        for (user, mutation, code) in cases {
            let req = request(user, Policy::REQUIRE_ADMIN).with_member_target(user, mutation);
            let response = f.pipeline.run(req, ok_handler).await;
            assert!(response.quota.is_none());

            let rejection = rejection(response);
            assert_eq!(rejection.status, 400);
            assert_eq!(rejection.code(), code);
        }

        // A viewer targeting someone else still hits the policy.
        let other = request("viewer-1", Policy::REQUIRE_ADMIN).with_member_target("admin-1", MemberMutation::Remove);
        assert_eq!(rejection(f.pipeline.run(other, ok_handler).await).code(), "INSUFFICIENT_PERMISSIONS");

        let admin = request("admin-1", Policy::REQUIRE_ADMIN).with_member_target("viewer-1", MemberMutation::Remove);
        assert_eq!(f.pipeline.run(admin, ok_handler).await.outcome.unwrap(), "admin-1:admin");
    }

    #[tokio::test]
    async fn test_free_tier_scenario() {
        let f = fixture(Environment::Production, 100);

        for _ in 0..100 {
            let response = f.pipeline.run(request("viewer-1", Policy::REQUIRE_VIEWER), ok_handler).await;
            assert!(response.outcome.is_ok());
            f.clock.advance(Duration::from_millis(100));
        }

        let response = f.pipeline.run(request("viewer-1", Policy::REQUIRE_VIEWER), ok_handler).await;
        let quota = response.quota.clone().unwrap();
        assert!(!quota.allowed);
        assert_eq!(quota.remaining, 0);

        let limited = rejection(response);
        assert_eq!(limited.status, 429);
        assert_eq!(limited.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(limited.retry_after, Some(50));
    }

    #[tokio::test]
    async fn test_tenants_have_separate_quota() {
        let f = fixture(Environment::Production, 2);

        for _ in 0..5 {
            f.pipeline.run(request("viewer-1", Policy::REQUIRE_VIEWER), ok_handler).await;
        }

        let other = GovernedRequest::new("/api/v1/widgets", Policy::REQUIRE_VIEWER, ClaimSet::new("globex", "viewer-1"));
        let response = f.pipeline.run(other, ok_handler).await;
        assert!(response.outcome.is_ok());
        assert_eq!(response.quota.unwrap().remaining, 1);
    }

    #[tokio::test]
    async fn test_excluded_path_is_never_limited() {
        let f = fixture(Environment::Production, 1);

        for _ in 0..5 {
            let req = GovernedRequest::new("/health", Policy::REQUIRE_VIEWER, ClaimSet::new("acme", "viewer-1"));
            let response = f.pipeline.run(req, ok_handler).await;
            assert!(response.outcome.is_ok());
            assert!(response.quota.is_none());
        }
    }

    #[tokio::test]
    async fn test_downstream_plan_limit() {
        let f = fixture(Environment::Production, 100);

        let response = f.pipeline.run(request("admin-1", Policy::REQUIRE_ADMIN), plan_limited_handler).await;
        assert!(response.quota.is_some());

        let rejection = rejection(response);
        assert_eq!(rejection.status, 403);
        assert_eq!(rejection.code(), "PLAN_LIMIT_EXCEEDED");
        assert_eq!(rejection.envelope.message, "plan limit exceeded");
        assert!(!rejection.envelope.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn test_handler_panic_is_normalized_and_still_charged() {
        let f = fixture(Environment::Development, 100);

        let response = f.pipeline.run(request("admin-1", Policy::REQUIRE_VIEWER), panicking_handler).await;
        assert_eq!(response.quota.as_ref().map(|q| q.remaining), Some(99));

        let rejection = rejection(response);
        assert_eq!(rejection.status, 500);
        assert_eq!(rejection.code(), "INTERNAL_ERROR");
        assert!(rejection.envelope.details.unwrap().contains("widget cache corrupted"));
    }

    struct BrokenRoles;

    #[async_trait]
    impl RoleStore for BrokenRoles {
        async fn get_role(&self, _tenant_id: &str, _user_id: &str) -> StoreResult<Option<Role>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn get_primary_admin_email(&self, _tenant_id: &str) -> StoreResult<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_role_store_failure_is_500() {
        let config = GovernanceConfig::default();
        let pipeline = GovernancePipeline::from_config(
            &config,
            Arc::new(BrokenRoles),
            Arc::new(InMemoryTierProvider::new()),
        );

        let response = pipeline.run(request("admin-1", Policy::REQUIRE_VIEWER), ok_handler).await;
        assert!(response.quota.is_none());

        let rejection = rejection(response);
        assert_eq!(rejection.status, 500);
        assert_eq!(rejection.envelope.details, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_requests_admit_exactly_limit() {
        let f = fixture(Environment::Production, 100);
        let pipeline = Arc::new(f.pipeline);

        let handles: Vec<_> = (0..1000)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline
                        .run(request("viewer-1", Policy::REQUIRE_VIEWER), ok_handler)
                        .await
                        .outcome
                        .is_ok()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 100);
    }
}
