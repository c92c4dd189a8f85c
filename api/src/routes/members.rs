//! Tenant membership endpoints
//!
//! All reads and writes are scoped to the caller's own tenant; the path
//! never names a tenant.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tenant_governance::{DownstreamError, ErrorEnvelope, MembershipDecision};

use crate::error::ApiError;
use crate::middleware::Caller;
use crate::models::{AssignRoleRequest, Member, MemberProfile};
use crate::ApiState;

/// Caller's own membership and effective role
#[utoipa::path(
    get,
    path = "/api/v1/members/me",
    responses(
        (status = 200, description = "Caller profile", body = MemberProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope),
        (status = 403, description = "Not a member", body = ErrorEnvelope),
        (status = 429, description = "Tenant quota exhausted", body = ErrorEnvelope)
    ),
    tag = "members"
)]
pub async fn me(Extension(caller): Extension<Caller>) -> Json<MemberProfile> {
    Json(MemberProfile::from(&caller))
}

/// Stored memberships of the caller's tenant
#[utoipa::path(
    get,
    path = "/api/v1/members",
    responses(
        (status = 200, description = "Tenant members", body = [Member]),
        (status = 403, description = "Caller is not an admin", body = ErrorEnvelope)
    ),
    tag = "members"
)]
pub async fn list_members(
    State(state): State<Arc<ApiState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Member>>, ApiError> {
    let members = state
        .members
        .list_members(&caller.ctx)
        .await?
        .map_err(ApiError::Denied)?;
    Ok(Json(members.into_iter().map(Member::from).collect()))
}

/// Assign a role to another member
#[utoipa::path(
    put,
    path = "/api/v1/members/{user_id}/role",
    params(("user_id" = String, Path, description = "Target user id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = Member),
        (status = 400, description = "Own role or unknown role name", body = ErrorEnvelope),
        (status = 403, description = "Insufficient role", body = ErrorEnvelope)
    ),
    tag = "members"
)]
pub async fn assign_role(
    State(state): State<Arc<ApiState>>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    payload: Result<Json<AssignRoleRequest>, JsonRejection>,
) -> Result<Json<Member>, ApiError> {
    let Json(body) = payload.map_err(|e| DownstreamError::InvalidArgument(e.body_text()))?;

    match state.members.assign_role(&caller.ctx, &user_id, &body.role).await? {
        MembershipDecision::Assigned(assignment) => Ok(Json(assignment.into())),
        MembershipDecision::Rejected(denial) => Err(ApiError::Denied(denial)),
        MembershipDecision::Removed { .. } => Err(anyhow::anyhow!("role assignment removed a member").into()),
    }
}

/// Remove another member from the tenant
#[utoipa::path(
    delete,
    path = "/api/v1/members/{user_id}",
    params(("user_id" = String, Path, description = "Target user id")),
    responses(
        (status = 204, description = "Member removed"),
        (status = 400, description = "Caller tried to remove themselves", body = ErrorEnvelope),
        (status = 404, description = "No such member", body = ErrorEnvelope)
    ),
    tag = "members"
)]
pub async fn remove_member(
    State(state): State<Arc<ApiState>>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.members.remove_member(&caller.ctx, &user_id).await? {
        MembershipDecision::Removed { .. } => Ok(StatusCode::NO_CONTENT),
        MembershipDecision::Rejected(denial) => Err(ApiError::Denied(denial)),
        MembershipDecision::Assigned(_) => Err(anyhow::anyhow!("member removal assigned a role").into()),
    }
}
