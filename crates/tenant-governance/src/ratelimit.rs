//! Per-Tenant Rate Limiting
//!
//! Fixed 60-second windows keyed by tenant id. A window charges on
//! arrival: admitted and rejected requests both count. On expiry the
//! window is replaced wholesale, never reset in place.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TierLimits;
use crate::context::TenantContext;
use crate::model::Tier;
use crate::store::TierProvider;

/// Time source in unix milliseconds
pub trait Clock: Send + Sync {
    /// Current time
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `now_millis`
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    /// Move forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One tenant's counting window
#[derive(Debug)]
pub struct RateWindow {
    tenant_id: String,
    window_start_ms: i64,
    limit: u64,
    count: AtomicU64,
}

impl RateWindow {
    fn new(tenant_id: &str, window_start_ms: i64, limit: u64, count: u64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            window_start_ms,
            limit,
            count: AtomicU64::new(count),
        }
    }

    fn is_expired(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms - self.window_start_ms >= window_ms
    }
}

/// Result of charging one request against a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCharge {
    /// Start of the window the request was counted in
    pub window_start_ms: i64,
    /// Post-increment count
    pub count: u64,
}

/// Read-only view of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Owning tenant
    pub tenant_id: String,
    /// Window start, unix millis
    pub window_start_ms: i64,
    /// Limit in force when the window opened
    pub limit: u64,
    /// Requests charged so far
    pub count: u64,
}

/// Shared, tenant-keyed window storage.
///
/// `charge` is the single atomic unit of fetch-or-create,
/// replace-if-expired and increment. A multi-process deployment backs
/// this with a shared cache offering the same guarantee.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Count one request for `tenant_id` at `now_ms`
    async fn charge(&self, tenant_id: &str, limit: u64, now_ms: i64, window_ms: i64) -> WindowCharge;

    /// Current window, without charging
    async fn peek(&self, tenant_id: &str) -> Option<WindowSnapshot>;

    /// Drop a tenant's window
    async fn evict(&self, tenant_id: &str) -> bool;

    /// Drop every window that has expired at `now_ms`; returns how many
    async fn purge_expired(&self, now_ms: i64, window_ms: i64) -> usize;
}

/// Lock-free in-process window store.
///
/// DashMap shards the tenant keys; each entry is an `ArcSwap` so expiry
/// installs a fresh window by compare-and-swap while increments are a
/// plain `fetch_add` on the current window.
#[derive(Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, Arc<ArcSwap<RateWindow>>>,
}

impl InMemoryWindowStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tenants with a live window
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no tenant has a window yet
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn slot(&self, tenant_id: &str, limit: u64, now_ms: i64) -> Arc<ArcSwap<RateWindow>> {
        if let Some(slot) = self.windows.get(tenant_id) {
            return slot.value().clone();
        }
        self.windows
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(RateWindow::new(tenant_id, now_ms, limit, 0))))
            .value()
            .clone()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn charge(&self, tenant_id: &str, limit: u64, now_ms: i64, window_ms: i64) -> WindowCharge {
        let slot = self.slot(tenant_id, limit, now_ms);

        loop {
            let current = slot.load_full();

            if current.is_expired(now_ms, window_ms) {
                let fresh = Arc::new(RateWindow::new(tenant_id, now_ms, limit, 1));
                let previous = slot.compare_and_swap(&current, fresh);
                if Arc::ptr_eq(&*previous, &current) {
                    return WindowCharge {
                        window_start_ms: now_ms,
                        count: 1,
                    };
                }
                // Another request replaced it first; charge that window.
                continue;
            }

            let count = current.count.fetch_add(1, Ordering::AcqRel) + 1;
            return WindowCharge {
                window_start_ms: current.window_start_ms,
                count,
            };
        }
    }

    async fn peek(&self, tenant_id: &str) -> Option<WindowSnapshot> {
        let slot = self.windows.get(tenant_id)?.value().clone();
        let window = slot.load();
        Some(WindowSnapshot {
            tenant_id: window.tenant_id.clone(),
            window_start_ms: window.window_start_ms,
            limit: window.limit,
            count: window.count.load(Ordering::Acquire),
        })
    }

    async fn evict(&self, tenant_id: &str) -> bool {
        self.windows.remove(tenant_id).is_some()
    }

    async fn purge_expired(&self, now_ms: i64, window_ms: i64) -> usize {
        let mut purged = 0;
        // A slot still referenced outside the map belongs to an in-flight
        // charge and stays until the next pass.
        self.windows.retain(|_, slot| {
            let keep = Arc::strong_count(slot) > 1 || !slot.load().is_expired(now_ms, window_ms);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }
}

/// Quota decision for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request is within quota
    pub allowed: bool,
    /// Requests per window for the tenant's tier
    pub limit: u64,
    /// Requests left in the window
    pub remaining: u64,
    /// Window end, unix seconds
    pub reset_at: i64,
    /// Seconds until the window ends; set on rejection, always > 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    /// Tier the limit came from
    pub tier: Tier,
}

/// Current quota usage without charging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Tier the limit came from
    pub tier: Tier,
    /// Requests per window
    pub limit: u64,
    /// Requests counted in the live window
    pub used: u64,
    /// Requests left in the live window
    pub remaining: u64,
    /// Window end, unix seconds; `None` when no window is live
    pub reset_at: Option<i64>,
}

/// Per-tenant request quota enforcement
pub struct TenantRateLimiter {
    store: Arc<dyn WindowStore>,
    tiers: Arc<dyn TierProvider>,
    limits: TierLimits,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl TenantRateLimiter {
    /// Create limiter
    pub fn new(
        store: Arc<dyn WindowStore>,
        tiers: Arc<dyn TierProvider>,
        limits: TierLimits,
        window: Duration,
    ) -> Self {
        Self {
            store,
            tiers,
            limits,
            window,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured limit for a tier
    pub fn limit_for(&self, tier: Tier) -> u64 {
        self.limits.limit_for(tier)
    }

    /// Look up the tenant's tier, failing open to the lowest tier
    pub async fn resolve_tier(&self, tenant_id: &str) -> Tier {
        match self.tiers.get_tier(tenant_id).await {
            Ok(tier) => tier,
            Err(e) => {
                let fallback = self.limits.lowest();
                tracing::warn!(
                    tenant_id,
                    error = %e,
                    fallback = %fallback,
                    "tier lookup failed, applying lowest tier"
                );
                fallback
            }
        }
    }

    /// Resolve the tier, then charge the request
    pub async fn admit(&self, ctx: &TenantContext) -> RateLimitDecision {
        let tier = self.resolve_tier(ctx.tenant_id()).await;
        self.check_and_consume(ctx, tier).await
    }

    /// Charge one request against the tenant's window for `tier`.
    ///
    /// The clock is read after tier resolution so lookup latency never
    /// widens the window.
    pub async fn check_and_consume(&self, ctx: &TenantContext, tier: Tier) -> RateLimitDecision {
        let limit = self.limits.limit_for(tier);
        let window_ms = self.window_ms();
        let now_ms = self.clock.now_millis();

        let charge = self
            .store
            .charge(ctx.tenant_id(), limit, now_ms, window_ms)
            .await;
        let reset_at_ms = charge.window_start_ms + window_ms;

        if charge.count <= limit {
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - charge.count,
                reset_at: millis_to_secs_ceil(reset_at_ms),
                retry_after_seconds: None,
                tier,
            }
        } else {
            let retry_ms = (reset_at_ms - now_ms).max(1);
            tracing::debug!(
                tenant_id = ctx.tenant_id(),
                tier = %tier,
                limit,
                count = charge.count,
                "tenant rate limit exceeded"
            );
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: millis_to_secs_ceil(reset_at_ms),
                retry_after_seconds: Some(millis_to_secs_ceil(retry_ms) as u64),
                tier,
            }
        }
    }

    /// Usage of the current window without charging
    pub async fn snapshot(&self, ctx: &TenantContext) -> QuotaSnapshot {
        let tier = self.resolve_tier(ctx.tenant_id()).await;
        let limit = self.limits.limit_for(tier);
        let window_ms = self.window_ms();
        let now_ms = self.clock.now_millis();

        let live = self
            .store
            .peek(ctx.tenant_id())
            .await
            .filter(|w| now_ms - w.window_start_ms < window_ms);

        match live {
            Some(window) => QuotaSnapshot {
                tier,
                limit,
                used: window.count,
                remaining: limit.saturating_sub(window.count),
                reset_at: Some(millis_to_secs_ceil(window.window_start_ms + window_ms)),
            },
            None => QuotaSnapshot {
                tier,
                limit,
                used: 0,
                remaining: limit,
                reset_at: None,
            },
        }
    }

    /// Drop the tenant's window
    pub async fn reset(&self, tenant_id: &str) -> bool {
        self.store.evict(tenant_id).await
    }

    /// Drop windows of tenants idle for a full window
    pub async fn purge_expired(&self) -> usize {
        let purged = self
            .store
            .purge_expired(self.clock.now_millis(), self.window_ms())
            .await;
        if purged > 0 {
            tracing::debug!(purged, "expired rate windows purged");
        }
        purged
    }

    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

fn millis_to_secs_ceil(ms: i64) -> i64 {
    (ms + 999).div_euclid(1000)
}
