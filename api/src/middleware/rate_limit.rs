//! Quota visibility headers

use axum::http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue};
use tenant_governance::RateLimitDecision;

/// Requests per window for the tenant's tier
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the window
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Window end, unix seconds
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Stamp the quota decision on a response
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));
    if let Some(retry) = decision.retry_after_seconds {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry));
    }
}
