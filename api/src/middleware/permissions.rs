//! Per-route policy enforcement
//!
//! Every route group is wrapped in [`govern`] with a fixed [`Policy`].
//! The inner handler runs as the pipeline's downstream handler, so its
//! errors and panics come back through the normalizer.
//!
//! Member-write groups also pass the `:user_id` they target, so a caller
//! acting on their own membership is refused before the policy runs.

use axum::extract::{OriginalUri, Path, Request, State};
use axum::http::Method;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tenant_governance::{
    DownstreamError, GovernedRequest, GovernedResponse, MemberMutation, Policy, Role, TenantContext,
};

use crate::error::rejection_response;
use crate::middleware::rate_limit::apply_quota_headers;
use crate::ApiState;

/// Admitted caller, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct Caller {
    /// Tenant context of the request
    pub ctx: TenantContext,
    /// Effective role
    pub role: Role,
}

/// Middleware state: shared API state plus the group's policy
#[derive(Clone)]
pub struct GovernedRoute {
    state: Arc<ApiState>,
    policy: Policy,
    member_writes: bool,
}

/// Wrap every route of `routes` with `policy`
pub fn with_policy(
    state: &Arc<ApiState>,
    policy: Policy,
    routes: Router<Arc<ApiState>>,
) -> Router<Arc<ApiState>> {
    layer(state, policy, false, routes)
}

/// Wrap member-write routes with `policy`; each route carries `:user_id`
pub fn with_member_policy(
    state: &Arc<ApiState>,
    policy: Policy,
    routes: Router<Arc<ApiState>>,
) -> Router<Arc<ApiState>> {
    layer(state, policy, true, routes)
}

fn layer(
    state: &Arc<ApiState>,
    policy: Policy,
    member_writes: bool,
    routes: Router<Arc<ApiState>>,
) -> Router<Arc<ApiState>> {
    let route = GovernedRoute {
        state: state.clone(),
        policy,
        member_writes,
    };
    routes.route_layer(from_fn_with_state(route, govern))
}

fn member_mutation(method: &Method) -> MemberMutation {
    if method == Method::DELETE {
        MemberMutation::Remove
    } else {
        MemberMutation::ChangeRole
    }
}

/// Run the governance pipeline around the inner handler
pub async fn govern(
    State(route): State<GovernedRoute>,
    params: Option<Path<HashMap<String, String>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut governed = match route.state.verifier.claims_from_headers(request.headers()) {
        Ok(claims) => GovernedRequest::new(path, route.policy, claims),
        Err(err) => GovernedRequest::unauthenticated(path, route.policy, err),
    };
    if route.member_writes {
        let target = params.and_then(|Path(mut params)| params.remove("user_id"));
        if let Some(user_id) = target {
            governed = governed.with_member_target(user_id, member_mutation(request.method()));
        }
    }

    let GovernedResponse { outcome, quota } = route
        .state
        .pipeline
        .run(governed, |ctx, role| async move {
            request.extensions_mut().insert(Caller { ctx, role });
            let mut response = next.run(request).await;
            match response.extensions_mut().remove::<DownstreamError>() {
                Some(err) => Err(err),
                None => Ok(response),
            }
        })
        .await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(rejection) => rejection_response(rejection),
    };
    if let Some(decision) = quota {
        apply_quota_headers(response.headers_mut(), &decision);
    }
    response
}
