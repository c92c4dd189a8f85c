//! Quota visibility

use axum::extract::State;
use axum::{Extension, Json};
use std::sync::Arc;
use tenant_governance::{ErrorEnvelope, QuotaSnapshot};

use crate::middleware::Caller;
use crate::ApiState;

/// Current window usage of the caller's tenant, this request included
#[utoipa::path(
    get,
    path = "/api/v1/quota",
    responses(
        (status = 200, description = "Quota snapshot", body = QuotaSnapshot),
        (status = 429, description = "Tenant quota exhausted", body = ErrorEnvelope)
    ),
    tag = "quota"
)]
pub async fn get_quota(
    State(state): State<Arc<ApiState>>,
    Extension(caller): Extension<Caller>,
) -> Json<QuotaSnapshot> {
    Json(state.pipeline.limiter().snapshot(&caller.ctx).await)
}
