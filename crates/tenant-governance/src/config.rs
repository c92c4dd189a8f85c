//! Governance configuration
//!
//! Layered with the `config` crate: an optional file, then
//! `GOVERNANCE__*` environment variables.

use config::{Config, ConfigBuilder, Environment as EnvSource, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{GovernanceError, GovernanceResult};
use crate::model::Tier;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Diagnostic details are returned to callers
    Development,
    /// Diagnostic details are logged only
    #[default]
    Production,
}

/// Static tier → requests-per-window table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    /// Free tier
    pub free: u64,
    /// Starter tier
    pub starter: u64,
    /// Pro tier
    pub pro: u64,
    /// Enterprise tier
    pub enterprise: u64,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            free: 100,
            starter: 300,
            pro: 1000,
            enterprise: 5000,
        }
    }
}

impl TierLimits {
    /// Limit for a tier
    pub fn limit_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Free => self.free,
            Tier::Starter => self.starter,
            Tier::Pro => self.pro,
            Tier::Enterprise => self.enterprise,
        }
    }

    /// Tier with the smallest configured limit
    pub fn lowest(&self) -> Tier {
        Tier::ALL
            .into_iter()
            .min_by_key(|tier| self.limit_for(*tier))
            .unwrap_or(Tier::Free)
    }
}

/// Bootstrap data for a tenant served by the in-memory stores
#[derive(Debug, Clone, Deserialize)]
pub struct TenantSeed {
    /// Tenant id
    pub id: String,
    /// Subscription tier
    pub tier: Tier,
    /// Bootstrap owner's email
    #[serde(default)]
    pub primary_admin_email: Option<String>,
    /// user id → role name
    #[serde(default)]
    pub members: HashMap<String, String>,
}

/// Governance configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Deployment environment
    pub environment: Environment,
    /// Rate window length in seconds
    pub window_seconds: u64,
    /// Tier limits
    pub tier_limits: TierLimits,
    /// Paths that are never rate limited
    pub excluded_paths: Vec<String>,
    /// HS256 secret of the upstream token issuer
    pub jwt_secret: String,
    /// Expected `iss` claim
    pub jwt_issuer: String,
    /// Server listen address
    pub bind_addr: String,
    /// Seed tenants
    pub tenants: Vec<TenantSeed>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            window_seconds: 60,
            tier_limits: TierLimits::default(),
            excluded_paths: vec![
                "/health".into(),
                "/docs".into(),
                "/api-docs/openapi.json".into(),
            ],
            jwt_secret: String::new(),
            jwt_issuer: "tenant-governance".into(),
            bind_addr: "0.0.0.0:8080".into(),
            tenants: Vec::new(),
        }
    }
}

impl GovernanceConfig {
    /// Load from `path` (or `./governance.*` if present) plus environment
    pub fn load(path: Option<&str>) -> GovernanceResult<Self> {
        let file = match path {
            Some(path) => File::with_name(path),
            None => File::with_name("governance").required(false),
        };
        Self::build(Config::builder().add_source(file))
    }

    /// Parse a TOML document, still honoring environment overrides
    pub fn from_toml(source: &str) -> GovernanceResult<Self> {
        Self::build(Config::builder().add_source(File::from_str(source, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> GovernanceResult<Self> {
        let config: Self = builder
            .add_source(EnvSource::with_prefix("GOVERNANCE").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| GovernanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the limiter cannot run with
    pub fn validate(&self) -> GovernanceResult<()> {
        if self.window_seconds == 0 {
            return Err(GovernanceError::Config("window_seconds must be positive".into()));
        }
        if let Some(tier) = Tier::ALL.into_iter().find(|t| self.tier_limits.limit_for(*t) == 0) {
            return Err(GovernanceError::Config(format!("tier limit for {tier} must be positive")));
        }
        Ok(())
    }

    /// Rate window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Whether diagnostic details may be returned to callers
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Whether `path` bypasses rate limiting
    pub fn is_excluded(&self, path: &str) -> bool {
        path_is_excluded(&self.excluded_paths, path)
    }
}

/// Exact match, or `path` lies under an excluded prefix
pub(crate) fn path_is_excluded(excluded_paths: &[String], path: &str) -> bool {
    excluded_paths.iter().any(|excluded| {
        path == excluded
            || path
                .strip_prefix(excluded.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}
