use axum::Extension;
use serde::Serialize;

use crate::auth::TenantIdentity;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::current_tenant_schema;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub identity: TenantIdentity,
    #[serde(rename = "resolvedSchema")]
    pub resolved_schema: String,
}

/// GET /api/auth/whoami - Identity carried by the presented token, plus the
/// schema the request context resolved to.
pub async fn whoami(Extension(identity): Extension<TenantIdentity>) -> ApiResult<WhoAmI> {
    Ok(ApiResponse::success(WhoAmI {
        identity,
        resolved_schema: current_tenant_schema(),
    }))
}
