//! Handler errors and terminal responses

use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tenant_governance::{Denial, DownstreamError, GovernanceError, Rejection};

/// Correlation id of an error envelope
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Error returned by route handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Handled by the governance normalizer
    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    /// Normal deny outcome of the role-management path
    #[error("{}", .0.message)]
    Denied(Denial),
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        Self::Downstream(err.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Downstream(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // The governance middleware takes the error back out of the
            // extensions and normalizes it.
            Self::Downstream(err) => {
                let status = StatusCode::from_u16(err.kind().status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let mut response = status.into_response();
                response.extensions_mut().insert(err);
                response
            }
            Self::Denied(denial) => rejection_response(Rejection::from_denial(denial)),
        }
    }
}

/// Render a terminal rejection
pub fn rejection_response(rejection: Rejection) -> Response {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let correlation_id = HeaderValue::from_str(&rejection.envelope.correlation_id).ok();

    let mut response = (status, Json(rejection.envelope)).into_response();
    let headers = response.headers_mut();
    if let Some(id) = correlation_id {
        headers.insert(X_CORRELATION_ID, id);
    }
    if let Some(retry) = rejection.retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry));
    }
    response
}
