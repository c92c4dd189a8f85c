//! Tenant Request Governance
//!
//! Cross-cutting pipeline every tenant-scoped API call passes through
//! before it reaches business logic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EXCEPTION NORMALIZER                             │
//! │        correlation id | uniform envelope | tenant-aware logging         │
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────┐  │
//! │  │   Context    │──▶│    Role      │──▶│   Tenant     │──▶│ Handler │  │
//! │  │  Extractor   │   │ Authorizer   │   │ Rate Limiter │   │         │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘   └─────────┘  │
//! │         │ 401              │ 403              │ 429                     │
//! │         ▼                  ▼                  ▼                         │
//! │                     terminal error envelope                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//!            │                  │                  │
//!       bearer claims       RoleStore      TierProvider + WindowStore
//! ```

#![warn(missing_docs)]

pub mod authz;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod ratelimit;
pub mod store;

pub use authz::{
    check_self_mutation, AuthzDecision, Denial, MemberMutation, MembershipDecision, MembershipGuard,
    RoleAuthorizationEngine,
};
pub use config::{Environment, GovernanceConfig, TierLimits};
pub use context::{ClaimSet, TenantContext, TenantContextExtractor};
pub use error::{DownstreamError, ErrorKind, GovernanceError, GovernanceResult, StoreError};
pub use model::{Policy, Role, RoleAssignment, Tier};
pub use normalizer::{ErrorEnvelope, ExceptionNormalizer, Fault, GovernanceLog, LogFields, LogScope, TracingLog};
pub use pipeline::{GovernancePipeline, GovernedRequest, GovernedResponse, Rejection};
pub use ratelimit::{
    Clock, InMemoryWindowStore, ManualClock, QuotaSnapshot, RateLimitDecision, SystemClock, TenantRateLimiter,
    WindowStore,
};
pub use store::{InMemoryRoleStore, InMemoryTierProvider, RoleAdminStore, RoleStore, TierProvider};
