//! OpenAPI document

use axum::Json;
use utoipa::OpenApi;

use crate::ApiDoc;

/// Generated OpenAPI document; never rate limited
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
